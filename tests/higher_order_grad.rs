// 원소별 단항 연산의 고차 미분 검사
// 차원 수 1~4마다 임의 모양의 표준정규 배열을 만들어
// 자동 미분으로 얻은 n차 기울기를 손으로 유도한 도함수와 비교한다

use std::f64::consts::{LN_10, LN_2};

use hograd::{
    abs, check_nth_order_unary, check_second_order_unary, cos, log, log10, log2, neg, rand_shape_nd,
    random_arrays, reciprocal, relu, sigmoid, sin, try_with_seed, with_seed, zeros_like, GradOp,
    Result, Variable, DEFAULT_DIM_MAX,
};
use ndarray::ArrayD;
use rstest::rstest;

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn random_input(dim: usize) -> ArrayD<f64> {
    let shape = rand_shape_nd(dim, DEFAULT_DIM_MAX);
    random_arrays(&shape)
}

#[rstest]
fn test_sin(#[values(1, 2, 3, 4)] dim: usize) -> Result<()> {
    init_logger();
    try_with_seed(None, || -> Result<()> {
        // sin → cos → -sin → -cos
        let grad_grad_op: GradOp<'_> = &|x: &Variable| neg(&sin(x));
        let grad_grad_grad_op: GradOp<'_> = &|x: &Variable| neg(&cos(x));

        let array = random_input(dim);
        check_second_order_unary(&array, sin, grad_grad_op)?;
        check_nth_order_unary(&array, sin, &[grad_grad_op, grad_grad_grad_op], &[2, 3])
    })
}

#[rstest]
fn test_cos(#[values(1, 2, 3, 4)] dim: usize) -> Result<()> {
    init_logger();
    try_with_seed(None, || -> Result<()> {
        // cos → -sin → -cos → sin
        let grad_grad_op: GradOp<'_> = &|x: &Variable| neg(&cos(x));
        let grad_grad_grad_op: GradOp<'_> = &|x: &Variable| sin(x);

        let array = random_input(dim);
        check_second_order_unary(&array, cos, grad_grad_op)?;
        check_nth_order_unary(&array, cos, &[grad_grad_op, grad_grad_grad_op], &[2, 3])
    })
}

#[rstest]
fn test_relu(#[values(1, 2, 3, 4)] dim: usize) -> Result<()> {
    init_logger();
    try_with_seed(None, || -> Result<()> {
        let grad_grad_op: GradOp<'_> = &|x: &Variable| zeros_like(x);

        let array = random_input(dim);
        check_second_order_unary(&array, relu, grad_grad_op)
    })
}

#[rstest]
fn test_log(#[values(1, 2, 3, 4)] dim: usize) -> Result<()> {
    init_logger();
    try_with_seed(None, || -> Result<()> {
        // 음수 입력에서 log 값은 NaN이지만 1/x, -1/x^2 은 유한
        let grad_op: GradOp<'_> = &|x: &Variable| 1.0 / x;
        let grad_grad_op: GradOp<'_> = &|x: &Variable| -1.0 / &x.pow(2.0);

        let array = random_input(dim);
        check_second_order_unary(&array, log, grad_grad_op)?;
        check_nth_order_unary(&array, log, &[grad_op, grad_grad_op], &[1, 2])
    })
}

#[rstest]
fn test_log2(#[values(1, 2, 3, 4)] dim: usize) -> Result<()> {
    init_logger();
    try_with_seed(None, || -> Result<()> {
        let grad_grad_op: GradOp<'_> = &|x: &Variable| -1.0 / &(&x.pow(2.0) * LN_2);

        let array = random_input(dim);
        check_second_order_unary(&array, log2, grad_grad_op)
    })
}

#[rstest]
fn test_log10(#[values(1, 2, 3, 4)] dim: usize) -> Result<()> {
    init_logger();
    try_with_seed(None, || -> Result<()> {
        let grad_grad_op: GradOp<'_> = &|x: &Variable| -1.0 / &(&x.pow(2.0) * LN_10);

        let array = random_input(dim);
        check_second_order_unary(&array, log10, grad_grad_op)
    })
}

#[rstest]
fn test_reciprocal(#[values(1, 2, 3, 4)] dim: usize) -> Result<()> {
    init_logger();
    try_with_seed(None, || -> Result<()> {
        let grad_grad_op: GradOp<'_> = &|x: &Variable| 2.0 / &x.pow(3.0);

        let array = random_input(dim);
        check_second_order_unary(&array, reciprocal, grad_grad_op)
    })
}

#[rstest]
fn test_abs(#[values(1, 2, 3, 4)] dim: usize) -> Result<()> {
    init_logger();
    try_with_seed(None, || -> Result<()> {
        let grad_grad_op: GradOp<'_> = &|x: &Variable| zeros_like(x);

        let array = random_input(dim);
        check_second_order_unary(&array, abs, grad_grad_op)
    })
}

#[rstest]
fn test_sigmoid(#[values(1, 2, 3, 4)] dim: usize) -> Result<()> {
    init_logger();
    try_with_seed(None, || -> Result<()> {
        // s' = s(1 - s), s'' = s'(1 - 2s)
        let grad_op: GradOp<'_> = &|x: &Variable| {
            let s = sigmoid(x);
            &s * &(1.0 - &s)
        };
        let grad_grad_op: GradOp<'_> = &|x: &Variable| {
            let s = sigmoid(x);
            &grad_op(x) * &(1.0 - &(2.0 * &s))
        };

        let array = random_input(dim);
        check_second_order_unary(&array, sigmoid, grad_grad_op)?;
        check_nth_order_unary(&array, sigmoid, &[grad_op, grad_grad_op], &[1, 2])?;
        check_nth_order_unary(&array, sigmoid, &[grad_grad_op], &[2])
    })
}

#[test]
fn test_fixed_seed_is_reproducible() {
    init_logger();
    let a = with_seed(Some(2024), || random_input(3));
    let b = with_seed(Some(2024), || random_input(3));
    assert_eq!(a, b);
}
