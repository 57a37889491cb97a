// Variable과 Function: 계산 그래프의 두 종류 노드
// Variable은 데이터와 기울기를, Function 노드는 입력/출력 연결과 세대(generation)를 가진다

use ndarray::{ArrayD, IxDyn};
use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use crate::config;
use crate::engine;
use crate::error::Result;
use crate::functions::{add, div, mul, neg, powfn, sub};

// --- 핵심 구조체 ---

pub(crate) struct FuncState {
    pub(crate) func: Box<dyn Function>,
    pub(crate) generation: u32,
    pub(crate) inputs: Vec<Variable>,
    pub(crate) outputs: Vec<Weak<RefCell<VarInner>>>,
    // 출력이 먼저 버려져도 0 기울기를 만들 수 있도록 모양을 따로 보관
    pub(crate) output_shapes: Vec<IxDyn>,
    // retain_graph=false 역전파가 지나간 뒤에는 inputs를 비우고 true로 표시
    pub(crate) released: bool,
}

pub(crate) type FuncStateRef = Rc<RefCell<FuncState>>;

pub(crate) struct VarInner {
    pub(crate) data: ArrayD<f64>,
    // 기울기도 Variable로 저장한다
    // create_graph=true로 만든 기울기는 자신의 creator 체인을 가지고 있어서
    // 그 기울기를 다시 미분하면 다음 차수의 도함수가 나온다
    //
    //   y = sin(x)
    //   x.grad = cos(x) * gy   ← creator: MulFn ← CosFn ← x
    //   x.grad를 다시 역전파하면 -sin(x) * gy * gy' 가 계산된다
    pub(crate) grad: Option<Variable>,
    pub(crate) creator: Option<FuncStateRef>,
    pub(crate) generation: u32,
    pub(crate) name: Option<String>,
    // attach_grad()로 미분 대상 leaf가 되었는지
    pub(crate) attached: bool,
}

/// 연산 기록 단위 텐서
/// clone()은 같은 노드를 가리키는 핸들을 하나 더 만든다 (데이터 복사 아님)
#[derive(Clone)]
pub struct Variable {
    pub(crate) inner: Rc<RefCell<VarInner>>,
}

impl Variable {
    pub fn new(data: ArrayD<f64>) -> Self {
        Variable {
            inner: Rc::new(RefCell::new(VarInner {
                data,
                grad: None,
                creator: None,
                generation: 0,
                name: None,
                attached: false,
            })),
        }
    }

    pub fn with_name(data: ArrayD<f64>, name: &str) -> Self {
        let v = Variable::new(data);
        v.set_name(name);
        v
    }

    pub fn set_name(&self, name: &str) {
        self.inner.borrow_mut().name = Some(name.to_string());
    }

    pub fn name(&self) -> Option<String> {
        self.inner.borrow().name.clone()
    }

    // --- 미분 대상 지정 ---

    /// 이 Variable을 미분 대상 leaf로 지정
    /// record() 안에서 이 Variable을 입력으로 받는 연산부터 그래프가 만들어진다
    pub fn attach_grad(&self) {
        let mut inner = self.inner.borrow_mut();
        inner.attached = true;
        inner.grad = None;
    }

    /// attach_grad()된 leaf이거나, 기록된 연산의 출력이면 true
    pub fn is_tracked(&self) -> bool {
        let inner = self.inner.borrow();
        inner.attached || inner.creator.is_some()
    }

    pub(crate) fn is_attached(&self) -> bool {
        self.inner.borrow().attached
    }

    pub(crate) fn creator(&self) -> Option<FuncStateRef> {
        self.inner.borrow().creator.clone()
    }

    /// 그래프 노드 식별용 포인터
    pub(crate) fn key(&self) -> *const RefCell<VarInner> {
        Rc::as_ptr(&self.inner)
    }

    // --- 데이터 접근 ---

    pub fn data(&self) -> ArrayD<f64> {
        self.inner.borrow().data.clone()
    }

    /// 기울기를 ArrayD로 반환
    pub fn grad(&self) -> Option<ArrayD<f64>> {
        self.inner.borrow().grad.as_ref().map(|g| g.data())
    }

    /// 기울기를 Variable로 반환 (고차 미분용)
    pub fn grad_var(&self) -> Option<Variable> {
        self.inner.borrow().grad.clone()
    }

    pub(crate) fn set_grad(&self, grad: Option<Variable>) {
        self.inner.borrow_mut().grad = grad;
    }

    pub fn set_data(&self, data: ArrayD<f64>) {
        self.inner.borrow_mut().data = data;
    }

    // --- 형상 정보 ---

    pub fn shape(&self) -> Vec<usize> {
        self.inner.borrow().data.shape().to_vec()
    }

    pub fn ndim(&self) -> usize {
        self.inner.borrow().data.ndim()
    }

    pub fn size(&self) -> usize {
        self.inner.borrow().data.len()
    }

    /// 첫 번째 축의 길이 (0차원 Variable은 0)
    pub fn len(&self) -> usize {
        self.inner.borrow().data.shape().first().copied().unwrap_or(0)
    }

    /// 원소가 하나도 없으면 true, len()이 아니라 size() 기준
    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// 거듭제곱 (Rust에는 ** 연산자가 없으므로 메서드로 제공)
    pub fn pow(&self, c: f64) -> Variable {
        powfn(self, c)
    }

    fn set_creator(&self, state: &FuncStateRef) {
        let func_gen = state.borrow().generation;
        let mut inner = self.inner.borrow_mut();
        inner.creator = Some(Rc::clone(state));
        inner.generation = func_gen + 1;
    }

    pub fn cleargrad(&self) {
        self.inner.borrow_mut().grad = None;
    }

    /// self에서 시작하는 역전파
    /// 시작 기울기는 self.grad가 있으면 그것, 없으면 1로 채운 배열
    /// 계산된 기울기는 attach_grad()된 leaf의 grad에 누적된다 (cleargrad()로 초기화)
    /// retain_grad=true면 중간 Variable에도 기울기를 남긴다
    /// create_graph=true면 역전파 계산도 그래프에 기록되어 grad_var()를 다시 미분할 수 있다
    pub fn backward(&self, retain_grad: bool, create_graph: bool) -> Result<()> {
        let seed = self
            .grad_var()
            .unwrap_or_else(|| Variable::new(ArrayD::ones(self.inner.borrow().data.raw_dim())));

        let grads = engine::run_backward(&[self.clone()], vec![seed], create_graph, true)?;

        for (var, gx) in grads.into_values() {
            if var.is_attached() {
                let _guard = config::using_recording(create_graph);
                let acc = match var.grad_var() {
                    Some(prev) => &prev + &gx,
                    None => gx,
                };
                var.set_grad(Some(acc));
            } else if retain_grad {
                var.set_grad(Some(gx));
            }
        }
        Ok(())
    }
}

impl fmt::Display for Variable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.borrow();
        let name = inner.name.as_deref().unwrap_or("");
        let data_str = format!("{}", inner.data);
        if name.is_empty() {
            write!(f, "variable({})", data_str)
        } else {
            write!(f, "variable({}, name={})", data_str, name)
        }
    }
}

impl fmt::Debug for Variable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("Variable")
            .field("shape", &inner.data.shape())
            .field("name", &inner.name)
            .field("generation", &inner.generation)
            .field("attached", &inner.attached)
            .finish()
    }
}

// --- 연산자 오버로딩 ---

// Variable 간 연산

impl std::ops::Neg for &Variable {
    type Output = Variable;
    fn neg(self) -> Variable {
        neg(self)
    }
}

impl std::ops::Add for &Variable {
    type Output = Variable;
    fn add(self, rhs: Self) -> Variable {
        add(self, rhs)
    }
}

impl std::ops::Sub for &Variable {
    type Output = Variable;
    fn sub(self, rhs: Self) -> Variable {
        sub(self, rhs)
    }
}

impl std::ops::Mul for &Variable {
    type Output = Variable;
    fn mul(self, rhs: Self) -> Variable {
        mul(self, rhs)
    }
}

impl std::ops::Div for &Variable {
    type Output = Variable;
    fn div(self, rhs: Self) -> Variable {
        div(self, rhs)
    }
}

// 스칼라(f64)와의 연산
// 스칼라는 0차원 Variable로 감싸고, 계산은 ndarray 브로드캐스트에 맡긴다

fn scalar(v: f64) -> Variable {
    Variable::new(ndarray::arr0(v).into_dyn())
}

impl std::ops::Add<f64> for &Variable {
    type Output = Variable;
    fn add(self, rhs: f64) -> Variable {
        add(self, &scalar(rhs))
    }
}

impl std::ops::Add<&Variable> for f64 {
    type Output = Variable;
    fn add(self, rhs: &Variable) -> Variable {
        add(&scalar(self), rhs)
    }
}

impl std::ops::Sub<f64> for &Variable {
    type Output = Variable;
    fn sub(self, rhs: f64) -> Variable {
        sub(self, &scalar(rhs))
    }
}

impl std::ops::Sub<&Variable> for f64 {
    type Output = Variable;
    fn sub(self, rhs: &Variable) -> Variable {
        sub(&scalar(self), rhs)
    }
}

impl std::ops::Mul<f64> for &Variable {
    type Output = Variable;
    fn mul(self, rhs: f64) -> Variable {
        mul(self, &scalar(rhs))
    }
}

impl std::ops::Mul<&Variable> for f64 {
    type Output = Variable;
    fn mul(self, rhs: &Variable) -> Variable {
        mul(&scalar(self), rhs)
    }
}

impl std::ops::Div<f64> for &Variable {
    type Output = Variable;
    fn div(self, rhs: f64) -> Variable {
        div(self, &scalar(rhs))
    }
}

impl std::ops::Div<&Variable> for f64 {
    type Output = Variable;
    fn div(self, rhs: &Variable) -> Variable {
        div(&scalar(self), rhs)
    }
}

// --- Function 트레잇과 Func ---

pub trait Function {
    fn forward(&self, xs: &[ArrayD<f64>]) -> Vec<ArrayD<f64>>;
    /// backward도 Variable 연산으로 작성해야 create_graph=true일 때 다시 미분할 수 있다
    fn backward(&self, xs: &[Variable], gys: &[Variable]) -> Vec<Variable>;
    fn name(&self) -> &str {
        "Function"
    }
}

pub struct Func {
    state: FuncStateRef,
}

impl Func {
    pub fn new(func: impl Function + 'static) -> Self {
        Func {
            state: Rc::new(RefCell::new(FuncState {
                func: Box::new(func),
                generation: 0,
                inputs: Vec::new(),
                outputs: Vec::new(),
                output_shapes: Vec::new(),
                released: false,
            })),
        }
    }

    pub fn call(&self, inputs: &[&Variable]) -> Variable {
        let xs: Vec<ArrayD<f64>> = inputs.iter().map(|v| v.inner.borrow().data.clone()).collect();

        let ys = self.state.borrow().func.forward(&xs);
        let outputs: Vec<Variable> = ys.into_iter().map(Variable::new).collect();

        // 기록 중이고 미분 대상과 연결된 입력이 하나라도 있을 때만 그래프를 만든다
        if config::is_recording() && inputs.iter().any(|v| v.is_tracked()) {
            let max_gen = inputs
                .iter()
                .map(|v| v.inner.borrow().generation)
                .max()
                .unwrap_or(0);

            {
                let mut state = self.state.borrow_mut();
                state.inputs = inputs.iter().map(|v| (*v).clone()).collect();
                state.generation = max_gen;
            }
            for output in &outputs {
                output.set_creator(&self.state);
            }
            let mut state = self.state.borrow_mut();
            state.outputs = outputs.iter().map(|o| Rc::downgrade(&o.inner)).collect();
            state.output_shapes = outputs.iter().map(|o| o.inner.borrow().data.raw_dim()).collect();
        }

        // 첫 번째 출력만 돌려준다, 나머지 출력은 역전파 때 기울기 0으로 취급
        outputs
            .into_iter()
            .next()
            .unwrap_or_else(|| Variable::new(ArrayD::zeros(IxDyn(&[]))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::record;
    use crate::functions::sin;

    fn arr(v: &[f64]) -> ArrayD<f64> {
        ndarray::Array1::from(v.to_vec()).into_dyn()
    }

    #[test]
    fn test_untracked_inputs_build_no_graph() {
        let _rec = record();
        let x = Variable::new(arr(&[1.0, 2.0]));
        let y = sin(&x);
        assert!(y.creator().is_none());
        assert!(!y.is_tracked());
    }

    #[test]
    fn test_not_recording_builds_no_graph() {
        let x = Variable::new(arr(&[1.0, 2.0]));
        x.attach_grad();
        let y = sin(&x);
        assert!(y.creator().is_none());
    }

    #[test]
    fn test_generation_follows_longest_path() {
        let _rec = record();
        let x = Variable::new(arr(&[0.5]));
        x.attach_grad();
        let a = sin(&x);
        let b = sin(&a);
        let c = &a + &b;
        assert_eq!(a.inner.borrow().generation, 1);
        assert_eq!(b.inner.borrow().generation, 2);
        assert_eq!(c.inner.borrow().generation, 3);
    }

    #[test]
    fn test_len_is_first_axis_and_is_empty_follows_size() {
        let scalar = Variable::new(ndarray::arr0(1.0).into_dyn());
        assert_eq!(scalar.size(), 1);
        assert_eq!(scalar.len(), 0);
        assert!(!scalar.is_empty());

        let matrix = Variable::new(ArrayD::zeros(IxDyn(&[3, 0])));
        assert_eq!(matrix.len(), 3);
        assert!(matrix.is_empty());

        assert!(!Variable::new(arr(&[1.0, 2.0])).is_empty());
    }

    #[test]
    fn test_display_with_name() {
        let x = Variable::with_name(ndarray::arr0(1.5).into_dyn(), "x");
        assert_eq!(format!("{}", x), "variable(1.5, name=x)");
        assert_eq!(format!("{}", Variable::new(ndarray::arr0(2.0).into_dyn())), "variable(2)");
    }

    #[test]
    fn test_backward_accumulates_until_cleargrad() {
        let x = Variable::new(ndarray::arr0(3.0).into_dyn());
        x.attach_grad();
        let y = {
            let _rec = record();
            &x * &x
        };
        y.backward(false, false).unwrap();
        y.backward(false, false).unwrap();
        // dy/dx = 2x = 6, 두 번 누적 → 12
        assert_eq!(x.grad().unwrap()[[]], 12.0);

        x.cleargrad();
        y.backward(false, false).unwrap();
        assert_eq!(x.grad().unwrap()[[]], 6.0);
    }

    #[test]
    fn test_backward_retain_grad_keeps_intermediates() {
        let x = Variable::new(ndarray::arr0(2.0).into_dyn());
        x.attach_grad();
        let (a, y) = {
            let _rec = record();
            let a = &x * 3.0;
            let y = &a * &a;
            (a, y)
        };
        y.backward(true, false).unwrap();
        // dy/da = 2a = 12
        assert_eq!(a.grad().unwrap()[[]], 12.0);
        // dy/dx = 18x = 36
        assert_eq!(x.grad().unwrap()[[]], 36.0);

        let x2 = Variable::new(ndarray::arr0(2.0).into_dyn());
        x2.attach_grad();
        let (a2, y2) = {
            let _rec = record();
            let a2 = &x2 * 3.0;
            let y2 = &a2 * &a2;
            (a2, y2)
        };
        y2.backward(false, false).unwrap();
        assert!(a2.grad().is_none());
    }
}
