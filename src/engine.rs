// 역전파 엔진
// 세대(generation)가 큰 Function부터 꺼내며 기울기를 입력 방향으로 전달한다
// 기울기는 Variable에 바로 쓰지 않고 지역 맵에 모았다가 호출자(backward, grad)가 나눠 갖는다

use ndarray::ArrayD;
use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use log::{debug, trace};

use crate::config;
use crate::error::{GradError, Result};
use crate::variable::{FuncState, FuncStateRef, VarInner, Variable};

type VarKey = *const RefCell<VarInner>;

/// Variable 포인터 → (Variable, 누적 기울기)
pub(crate) type GradMap = HashMap<VarKey, (Variable, Variable)>;

fn accumulate(grads: &mut GradMap, var: &Variable, gx: Variable) {
    match grads.get_mut(&var.key()) {
        // 같은 Variable에 여러 경로로 기울기가 오면 더한다
        // create_graph=true면 이 덧셈도 그래프에 기록된다
        Some((_, prev)) => {
            let sum = &*prev + &gx;
            *prev = sum;
        }
        None => {
            grads.insert(var.key(), (var.clone(), gx));
        }
    }
}

/// heads에서 시작해 그래프 전체를 역방향으로 훑는다
/// create_graph: 역전파 계산 자체를 그래프에 기록할지 (고차 미분에 필요)
/// retain_graph: false면 지나간 Function 노드를 해제해서 같은 그래프를 다시 역전파할 수 없게 된다
pub(crate) fn run_backward(
    heads: &[Variable],
    head_grads: Vec<Variable>,
    create_graph: bool,
    retain_graph: bool,
) -> Result<GradMap> {
    let mut grads: GradMap = HashMap::new();
    let mut funcs: Vec<FuncStateRef> = Vec::new();
    let mut seen: HashSet<*const RefCell<FuncState>> = HashSet::new();
    let mut visited: Vec<FuncStateRef> = Vec::new();

    let add_func = |f: FuncStateRef,
                    funcs: &mut Vec<FuncStateRef>,
                    seen: &mut HashSet<*const RefCell<FuncState>>| {
        let ptr = Rc::as_ptr(&f);
        if seen.insert(ptr) {
            funcs.push(f);
            funcs.sort_by_key(|f| f.borrow().generation);
        }
    };

    for (head, gy) in heads.iter().zip(head_grads) {
        accumulate(&mut grads, head, gy);
        if let Some(creator) = head.creator() {
            add_func(creator, &mut funcs, &mut seen);
        }
    }

    // 역전파 중의 기록 여부 = create_graph
    let _guard = config::using_recording(create_graph);

    while let Some(state_ref) = funcs.pop() {
        let (gxs, inputs) = {
            let state = state_ref.borrow();
            if state.released {
                return Err(GradError::GraphReleased {
                    op: state.func.name().to_string(),
                });
            }

            // 기울기가 오지 않았거나 이미 버려진 출력은 0으로 본다
            let mut gys = Vec::with_capacity(state.outputs.len());
            for (output, shape) in state.outputs.iter().zip(&state.output_shapes) {
                let gy = output
                    .upgrade()
                    .and_then(|out| grads.get(&Rc::as_ptr(&out)).map(|(_, g)| g.clone()))
                    .unwrap_or_else(|| Variable::new(ArrayD::zeros(shape.clone())));
                gys.push(gy);
            }

            trace!(
                "backward through {} (generation {})",
                state.func.name(),
                state.generation
            );
            let gxs = state.func.backward(&state.inputs, &gys);
            (gxs, state.inputs.clone())
        };

        for (input, gx) in inputs.iter().zip(gxs) {
            // 미분 대상과 무관한 입력(스칼라 상수 등)은 건너뛴다
            if !input.is_tracked() {
                continue;
            }
            accumulate(&mut grads, input, gx);
            if let Some(creator) = input.creator() {
                add_func(creator, &mut funcs, &mut seen);
            }
        }

        visited.push(state_ref);
    }

    if !retain_graph {
        for state_ref in &visited {
            let mut state = state_ref.borrow_mut();
            state.inputs.clear();
            state.released = true;
        }
    }

    debug!(
        "backward visited {} functions (create_graph={}, retain_graph={})",
        visited.len(),
        create_graph,
        retain_graph
    );
    Ok(grads)
}

/// heads를 variables로 미분한 기울기를 반환한다 (Variable의 grad 필드는 건드리지 않음)
///
/// head_grads가 None이면 각 head와 같은 모양의 1 배열을 쓴다.
/// create_graph=true면 반환된 기울기에도 그래프가 붙어 있어서 다시 grad()에 넣을 수 있다.
/// 같은 그래프를 여러 번 미분하려면 retain_graph=true로 호출해야 한다.
pub fn grad(
    heads: &[&Variable],
    variables: &[&Variable],
    head_grads: Option<&[&Variable]>,
    create_graph: bool,
    retain_graph: bool,
) -> Result<Vec<Variable>> {
    if heads.is_empty() {
        return Err(GradError::InvalidArgument("heads must not be empty".into()));
    }

    let seeds: Vec<Variable> = match head_grads {
        Some(hgs) => {
            if hgs.len() != heads.len() {
                return Err(GradError::InvalidArgument(format!(
                    "{} head gradients given for {} heads",
                    hgs.len(),
                    heads.len()
                )));
            }
            for (head, hg) in heads.iter().zip(hgs) {
                if head.shape() != hg.shape() {
                    return Err(GradError::ShapeMismatch {
                        what: "head gradient".into(),
                        expected: head.shape(),
                        got: hg.shape(),
                    });
                }
            }
            hgs.iter().map(|hg| (*hg).clone()).collect()
        }
        None => heads
            .iter()
            .map(|h| Variable::new(ArrayD::ones(h.inner.borrow().data.raw_dim())))
            .collect(),
    };

    for head in heads {
        if !head.is_tracked() {
            return Err(GradError::NotRecorded {
                name: head.name().unwrap_or_else(|| "<unnamed>".to_string()),
            });
        }
    }
    for (index, var) in variables.iter().enumerate() {
        if !var.is_tracked() {
            return Err(GradError::NotAttached { index });
        }
    }

    let heads: Vec<Variable> = heads.iter().map(|h| (*h).clone()).collect();
    let grads = run_backward(&heads, seeds, create_graph, retain_graph)?;

    variables
        .iter()
        .enumerate()
        .map(|(index, var)| {
            grads
                .get(&var.key())
                .map(|(_, g)| g.clone())
                .ok_or(GradError::Unreachable { index })
        })
        .collect()
}
