// 시드 고정 난수
// 검사 하나하나가 같은 시드로 다시 돌 수 있도록 스레드 로컬 StdRng 하나만 쓴다

use ndarray::{ArrayD, IxDyn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, StandardNormal};
use std::cell::RefCell;

use log::{error, info, warn};

use crate::config::{Config, SEED_ENV};
use crate::variable::Variable;

thread_local! {
    static RNG: RefCell<StdRng> = RefCell::new(StdRng::from_entropy());
}

/// rand_shape_nd의 축 길이 기본 상한
pub const DEFAULT_DIM_MAX: usize = 10;

pub fn seed(seed: u64) {
    RNG.with(|r| *r.borrow_mut() = StdRng::seed_from_u64(seed));
}

fn with_rng<R>(f: impl FnOnce(&mut StdRng) -> R) -> R {
    RNG.with(|r| f(&mut r.borrow_mut()))
}

fn report_failure(seed: u64) {
    error!(
        "check failed with seed {}; rerun with {}={} to reproduce",
        seed, SEED_ENV, seed
    );
}

// 테스트가 패닉으로 끝나면 재현용 시드를 로그로 남긴다
struct SeedReporter {
    seed: u64,
}

impl Drop for SeedReporter {
    fn drop(&mut self) {
        if std::thread::panicking() {
            report_failure(self.seed);
        }
    }
}

/// 우선순위: 인자로 받은 seed → HOGRAD_TEST_SEED 환경 변수 → 새로 뽑은 31비트 시드
fn choose_seed(seed_opt: Option<u64>) -> u64 {
    let env_seed = match Config::from_env() {
        Ok(config) => config.seed,
        Err(e) => {
            warn!("{}; ignoring", e);
            None
        }
    };
    let chosen = seed_opt
        .or(env_seed)
        .unwrap_or_else(|| rand::random::<u64>() & 0x7fff_ffff);

    info!("setting test seed {}; use {}={} to reproduce", chosen, SEED_ENV, chosen);
    seed(chosen);
    chosen
}

/// 시드를 정하고 f를 실행, f가 패닉하면 시드를 error 레벨로 남긴다
pub fn with_seed<R>(seed_opt: Option<u64>, f: impl FnOnce() -> R) -> R {
    let _reporter = SeedReporter { seed: choose_seed(seed_opt) };
    f()
}

/// Result를 돌려주는 검사용 with_seed
/// Err로 끝나도 패닉과 마찬가지로 재현용 시드를 error 레벨로 남긴다
pub fn try_with_seed<T, E>(seed_opt: Option<u64>, f: impl FnOnce() -> Result<T, E>) -> Result<T, E>
where
    E: std::fmt::Display,
{
    let chosen = choose_seed(seed_opt);
    let _reporter = SeedReporter { seed: chosen };
    let result = f();
    if let Err(e) = &result {
        error!("{}", e);
        report_failure(chosen);
    }
    result
}

/// ndim 차원의 임의 모양, 각 축 길이는 1..=dim_max
pub fn rand_shape_nd(ndim: usize, dim_max: usize) -> Vec<usize> {
    let dim_max = dim_max.max(1);
    with_rng(|rng| (0..ndim).map(|_| rng.gen_range(1..=dim_max)).collect())
}

/// 표준정규분포로 채운 배열
pub fn random_arrays(shape: &[usize]) -> ArrayD<f64> {
    with_rng(|rng| ArrayD::from_shape_simple_fn(IxDyn(shape), || StandardNormal.sample(rng)))
}

/// 표준정규분포 head gradient (미분 대상이 아닌 상수 Variable)
pub fn random_normal(shape: &[usize]) -> Variable {
    Variable::new(random_arrays(shape))
}
