// 검사가 실패하면 재현용 시드가 error 레벨 로그에 남는지 확인
// 전역 로거를 직접 설치하므로 다른 테스트 파일과 분리해 둔다

use std::sync::Mutex;

use hograd::{check_second_order_unary, cos, random_arrays, sin, try_with_seed, GradError, GradOp, Variable};
use log::{Level, LevelFilter, Log, Metadata, Record};

struct CaptureLogger {
    errors: Mutex<Vec<String>>,
}

impl Log for CaptureLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= Level::Error
    }

    fn log(&self, record: &Record) {
        if record.level() == Level::Error {
            self.errors.lock().unwrap().push(record.args().to_string());
        }
    }

    fn flush(&self) {}
}

static LOGGER: CaptureLogger = CaptureLogger {
    errors: Mutex::new(Vec::new()),
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failed_check_logs_reproduction_seed() {
        log::set_logger(&LOGGER).unwrap();
        log::set_max_level(LevelFilter::Error);

        // sin의 2차 도함수는 -sin, cos를 넘기면 반드시 실패
        let wrong: GradOp<'_> = &|x: &Variable| cos(x);
        let result = try_with_seed(Some(4242), || {
            let array = random_arrays(&[3, 4]);
            check_second_order_unary(&array, sin, wrong)
        });
        assert!(matches!(result, Err(GradError::CheckFailed { order: 2, .. })));

        let errors = LOGGER.errors.lock().unwrap().clone();
        assert!(
            errors.iter().any(|m| m.contains("seed 4242") && m.contains("HOGRAD_TEST_SEED=4242")),
            "no reproduction seed in error logs: {:?}",
            errors
        );

        // 성공한 검사는 error 로그를 남기지 않는다
        let before = errors.len();
        let passed: Result<(), GradError> = try_with_seed(Some(1), || Ok(()));
        assert!(passed.is_ok());
        assert_eq!(LOGGER.errors.lock().unwrap().len(), before);
    }
}
