// 수치 비교와 n차 미분 검사
//
// check_nth_order_unary는 record() 안에서 grad(create_graph=true)를 order번 반복한다.
// 매 차수마다 새 head gradient h_k를 뽑아 곱하므로 k차 기울기의 기대값은
//
//   f^(k)(x) * h_1 * h_2 * ... * h_k
//
// 가 된다 (연쇄 법칙, 원소별 연산이라 야코비안이 대각 행렬).

use ndarray::{ArrayD, Dimension};

use log::debug;

use crate::config::{pause, record, Config, Tolerance};
use crate::dot::get_dot_graph;
use crate::engine::grad;
use crate::error::{GradError, Result};
use crate::random::random_normal;
use crate::variable::Variable;

/// 기준 도함수: x를 받아 해당 차수 도함수 값을 계산
pub type GradOp<'a> = &'a dyn Fn(&Variable) -> Variable;

/// 원소별로 |expected - actual| <= atol + rtol * |actual| 인지 확인
/// 실패하면 허용치를 가장 크게 넘은 원소를 보고한다. NaN은 항상 실패.
pub fn almost_equal(expected: &ArrayD<f64>, actual: &ArrayD<f64>, tolerance: Tolerance) -> Result<()> {
    if expected.shape() != actual.shape() {
        return Err(GradError::ShapeMismatch {
            what: "compared arrays".into(),
            expected: expected.shape().to_vec(),
            got: actual.shape().to_vec(),
        });
    }

    let mut worst: Option<(f64, Vec<usize>, f64, f64, f64)> = None;
    for ((index, &e), &a) in expected.indexed_iter().zip(actual.iter()) {
        let allowed = tolerance.atol + tolerance.rtol * a.abs();
        let diff = (e - a).abs();
        // NaN이 섞이면 diff <= allowed 가 false
        if diff <= allowed {
            continue;
        }
        let excess = if diff.is_nan() { f64::INFINITY } else { diff / allowed };
        if worst.as_ref().map_or(true, |w| excess > w.0) {
            worst = Some((excess, index.slice().to_vec(), e, a, allowed));
        }
    }

    match worst {
        None => Ok(()),
        Some((_, index, expected, actual, allowed)) => Err(GradError::NotClose {
            index,
            expected,
            actual,
            allowed,
        }),
    }
}

/// almost_equal의 패닉 버전 (기본 허용치)
pub fn assert_almost_equal(expected: &ArrayD<f64>, actual: &ArrayD<f64>) {
    if let Err(e) = almost_equal(expected, actual, Tolerance::default()) {
        panic!("assert_almost_equal failed: {}", e);
    }
}

fn validate_orders(grad_ops: usize, orders: &[usize]) -> Result<()> {
    if orders.is_empty() {
        return Err(GradError::InvalidArgument("at least one order is required".into()));
    }
    if grad_ops != orders.len() {
        return Err(GradError::InvalidArgument(format!(
            "{} reference derivatives for {} orders",
            grad_ops,
            orders.len()
        )));
    }
    if orders[0] == 0 {
        return Err(GradError::InvalidArgument("orders start at 1".into()));
    }
    if orders.windows(2).any(|w| w[0] >= w[1]) {
        return Err(GradError::InvalidArgument(format!(
            "orders must be strictly increasing, got {:?}",
            orders
        )));
    }
    Ok(())
}

/// x에 op를 적용한 결과를 반복 미분해 orders의 각 차수 기울기를 grad_ops와 비교한다
///
/// grad_ops[i]는 orders[i]차 도함수. 예) sin에 대해 [2, 3] 차수를 보려면
/// grad_ops = [-sin, -cos], orders = [2, 3]
pub fn check_nth_order_unary<F>(
    x: &ArrayD<f64>,
    op: F,
    grad_ops: &[GradOp<'_>],
    orders: &[usize],
) -> Result<()>
where
    F: Fn(&Variable) -> Variable,
{
    validate_orders(grad_ops.len(), orders)?;
    let tolerance = Config::from_env()?.tolerance;

    let x = Variable::new(x.clone());
    x.attach_grad();

    let max_order = orders[orders.len() - 1];

    // 기대값 계산은 그래프에 남기지 않는다
    let expected_grads: Vec<ArrayD<f64>> = {
        let _pause = pause();
        grad_ops.iter().map(|grad_op| grad_op(&x).data()).collect()
    };
    let mut computed_grads: Vec<Variable> = Vec::with_capacity(orders.len());
    let mut head_grads: Vec<ArrayD<f64>> = Vec::with_capacity(max_order);

    {
        let _rec = record();
        let mut y = op(&x);
        for current_order in 1..=max_order {
            let head_grad = random_normal(&x.shape());
            // create_graph: 이번 기울기를 다음 차수에서 다시 미분
            // retain_graph: 앞 차수 그래프를 계속 거쳐 가야 하므로 해제하지 않음
            y = grad(&[&y], &[&x], Some(&[&head_grad]), true, true)?.remove(0);
            debug!("computed order {} gradient, shape {:?}", current_order, y.shape());
            if orders.contains(&current_order) {
                computed_grads.push(y.clone());
            }
            head_grads.push(head_grad.data());
        }
    }

    for ((&order, expected), computed) in orders.iter().zip(expected_grads).zip(&computed_grads) {
        let mut expected = expected;
        for head_grad in &head_grads[..order] {
            expected *= head_grad;
        }

        if let Err(e) = almost_equal(&expected, &computed.data(), tolerance) {
            debug!("order {} gradient graph:\n{}", order, get_dot_graph(computed, true));
            return Err(GradError::CheckFailed {
                order,
                source: Box::new(e),
            });
        }
    }

    Ok(())
}

/// 2차 미분 하나만 확인하는 단축 버전
pub fn check_second_order_unary<F>(x: &ArrayD<f64>, op: F, grad_grad_op: GradOp<'_>) -> Result<()>
where
    F: Fn(&Variable) -> Variable,
{
    check_nth_order_unary(x, op, &[grad_grad_op], &[2])
}
