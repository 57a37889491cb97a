// hograd 라이브러리
// ndarray 위의 define-by-run 자동 미분과 고차 미분 검사 도구
//
// 흐름: record() 안에서 attach_grad()한 Variable로 연산 → grad(create_graph=true)로 기울기를 얻고
//       그 기울기를 다시 grad()에 넣어 다음 차수 도함수를 계산한다

pub mod config;
pub mod dot;
mod engine;
pub mod error;
pub mod functions;
pub mod random;
pub mod testing;
mod variable;

pub use config::{is_recording, pause, record, Config, RecordGuard, Tolerance};
pub use dot::get_dot_graph;
pub use engine::grad;
pub use error::{GradError, Result};
pub use functions::{
    abs, add, cos, div, log, log10, log2, mul, neg, powfn, reciprocal, relu, sigmoid, sign, sin,
    step, sub, zeros_like,
};
pub use random::{
    rand_shape_nd, random_arrays, random_normal, seed, try_with_seed, with_seed,
    DEFAULT_DIM_MAX,
};
pub use testing::{
    almost_equal, assert_almost_equal, check_nth_order_unary, check_second_order_unary, GradOp,
};
pub use variable::{Func, Function, Variable};
