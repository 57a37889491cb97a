// 기록(record) 모드와 환경 변수 설정
// 기록 모드는 스레드 로컬 플래그 하나로 관리하고, RAII 가드로 이전 값을 복원한다

use std::cell::Cell;

use crate::error::{GradError, Result};

thread_local! {
    // 기본값은 false: record() 스코프 안에서만 계산 그래프를 만든다
    static RECORDING: Cell<bool> = const { Cell::new(false) };
}

/// 재현용 시드를 지정하는 환경 변수
pub const SEED_ENV: &str = "HOGRAD_TEST_SEED";
/// 상대 오차 허용치를 덮어쓰는 환경 변수
pub const RTOL_ENV: &str = "HOGRAD_RTOL";
/// 절대 오차 허용치를 덮어쓰는 환경 변수
pub const ATOL_ENV: &str = "HOGRAD_ATOL";

// --- record / pause 모드 ---

pub struct RecordGuard {
    prev: bool,
}

impl Drop for RecordGuard {
    fn drop(&mut self) {
        RECORDING.with(|c| c.set(self.prev));
    }
}

/// 그래프 기록을 켜는 RAII 가드
/// let _rec = record(); 형태로 사용, 스코프 종료 시 이전 상태로 복원
pub fn record() -> RecordGuard {
    using_recording(true)
}

/// 그래프 기록을 잠시 끄는 RAII 가드
/// record() 스코프 안에서 기대값 계산처럼 그래프에 남기면 안 되는 연산에 사용
pub fn pause() -> RecordGuard {
    using_recording(false)
}

pub fn is_recording() -> bool {
    RECORDING.with(|c| c.get())
}

/// 기록 여부를 enable 값으로 설정하고 이전 값을 가드에 보관
/// 역전파 중에는 create_graph 값으로 호출된다
pub(crate) fn using_recording(enable: bool) -> RecordGuard {
    let prev = RECORDING.with(|c| c.replace(enable));
    RecordGuard { prev }
}

// --- 수치 비교 허용치 ---

/// |expected - actual| <= atol + rtol * |actual| 이면 같은 값으로 본다
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tolerance {
    pub rtol: f64,
    pub atol: f64,
}

impl Default for Tolerance {
    // float64 기준 기본값
    fn default() -> Self {
        Tolerance { rtol: 1e-5, atol: 1e-20 }
    }
}

// --- 환경 변수 설정 ---

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Config {
    /// 고정 시드 (없으면 매 테스트마다 새 시드)
    pub seed: Option<u64>,
    pub tolerance: Tolerance,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// 환경 변수 조회를 주입받는 버전 (테스트에서 프로세스 환경을 건드리지 않기 위함)
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Config::default();

        if let Some(raw) = lookup(SEED_ENV) {
            config.seed = Some(parse_value(SEED_ENV, &raw)?);
        }
        if let Some(raw) = lookup(RTOL_ENV) {
            config.tolerance.rtol = parse_value(RTOL_ENV, &raw)?;
        }
        if let Some(raw) = lookup(ATOL_ENV) {
            config.tolerance.atol = parse_value(ATOL_ENV, &raw)?;
        }

        Ok(config)
    }
}

fn parse_value<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T> {
    raw.trim().parse().map_err(|_| GradError::Config {
        key: key.to_string(),
        value: raw.to_string(),
    })
}
