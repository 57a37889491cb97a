// 원소별 연산 모음
// 모든 backward는 Variable 연산으로만 작성한다
// 그래야 create_graph=true일 때 역전파 계산도 그래프에 남아서 몇 번이든 다시 미분할 수 있다

use ndarray::ArrayD;
use std::f64::consts::{LN_10, LN_2};

use crate::variable::{Func, Function, Variable};

// --- 산술 연산 ---

struct NegFn;

impl Function for NegFn {
    fn forward(&self, xs: &[ArrayD<f64>]) -> Vec<ArrayD<f64>> {
        vec![-&xs[0]]
    }
    fn backward(&self, _xs: &[Variable], gys: &[Variable]) -> Vec<Variable> {
        vec![neg(&gys[0])]
    }
    fn name(&self) -> &str { "Neg" }
}

struct AddFn;

impl Function for AddFn {
    fn forward(&self, xs: &[ArrayD<f64>]) -> Vec<ArrayD<f64>> {
        vec![&xs[0] + &xs[1]]
    }
    fn backward(&self, _xs: &[Variable], gys: &[Variable]) -> Vec<Variable> {
        vec![gys[0].clone(), gys[0].clone()]
    }
    fn name(&self) -> &str { "Add" }
}

struct SubFn;

impl Function for SubFn {
    fn forward(&self, xs: &[ArrayD<f64>]) -> Vec<ArrayD<f64>> {
        vec![&xs[0] - &xs[1]]
    }
    fn backward(&self, _xs: &[Variable], gys: &[Variable]) -> Vec<Variable> {
        vec![gys[0].clone(), neg(&gys[0])]
    }
    fn name(&self) -> &str { "Sub" }
}

struct MulFn;

impl Function for MulFn {
    fn forward(&self, xs: &[ArrayD<f64>]) -> Vec<ArrayD<f64>> {
        vec![&xs[0] * &xs[1]]
    }
    fn backward(&self, xs: &[Variable], gys: &[Variable]) -> Vec<Variable> {
        vec![&xs[1] * &gys[0], &xs[0] * &gys[0]]
    }
    fn name(&self) -> &str { "Mul" }
}

struct DivFn;

impl Function for DivFn {
    fn forward(&self, xs: &[ArrayD<f64>]) -> Vec<ArrayD<f64>> {
        vec![&xs[0] / &xs[1]]
    }
    fn backward(&self, xs: &[Variable], gys: &[Variable]) -> Vec<Variable> {
        let gx0 = &gys[0] / &xs[1];
        let gx1 = &(&neg(&gys[0]) * &xs[0]) / &(&xs[1] * &xs[1]);
        vec![gx0, gx1]
    }
    fn name(&self) -> &str { "Div" }
}

struct PowFn {
    c: f64,
}

impl Function for PowFn {
    fn forward(&self, xs: &[ArrayD<f64>]) -> Vec<ArrayD<f64>> {
        vec![xs[0].mapv(|x| x.powf(self.c))]
    }
    fn backward(&self, xs: &[Variable], gys: &[Variable]) -> Vec<Variable> {
        let c = self.c;
        vec![&(c * &xs[0].pow(c - 1.0)) * &gys[0]]
    }
    fn name(&self) -> &str { "Pow" }
}

// --- 삼각 함수 ---
// sin → cos → -sin → -cos → sin ... 으로 순환

struct SinFn;

impl Function for SinFn {
    fn forward(&self, xs: &[ArrayD<f64>]) -> Vec<ArrayD<f64>> {
        vec![xs[0].mapv(f64::sin)]
    }
    fn backward(&self, xs: &[Variable], gys: &[Variable]) -> Vec<Variable> {
        vec![&cos(&xs[0]) * &gys[0]]
    }
    fn name(&self) -> &str { "Sin" }
}

struct CosFn;

impl Function for CosFn {
    fn forward(&self, xs: &[ArrayD<f64>]) -> Vec<ArrayD<f64>> {
        vec![xs[0].mapv(f64::cos)]
    }
    fn backward(&self, xs: &[Variable], gys: &[Variable]) -> Vec<Variable> {
        vec![&neg(&sin(&xs[0])) * &gys[0]]
    }
    fn name(&self) -> &str { "Cos" }
}

// --- 로그 ---
// 순전파는 음수 입력에서 NaN이 되지만, 도함수 1/x 는 x만 쓰므로 기울기는 유한하다

struct LogFn;

impl Function for LogFn {
    fn forward(&self, xs: &[ArrayD<f64>]) -> Vec<ArrayD<f64>> {
        vec![xs[0].mapv(f64::ln)]
    }
    fn backward(&self, xs: &[Variable], gys: &[Variable]) -> Vec<Variable> {
        vec![&gys[0] / &xs[0]]
    }
    fn name(&self) -> &str { "Log" }
}

/// 밑이 base인 로그: d/dx log_b(x) = 1 / (x ln b)
struct LogBaseFn {
    ln_base: f64,
    name: &'static str,
}

impl Function for LogBaseFn {
    fn forward(&self, xs: &[ArrayD<f64>]) -> Vec<ArrayD<f64>> {
        let ln_base = self.ln_base;
        vec![xs[0].mapv(|x| x.ln() / ln_base)]
    }
    fn backward(&self, xs: &[Variable], gys: &[Variable]) -> Vec<Variable> {
        vec![&gys[0] / &(&xs[0] * self.ln_base)]
    }
    fn name(&self) -> &str { self.name }
}

// --- 역수 ---

struct ReciprocalFn;

impl Function for ReciprocalFn {
    fn forward(&self, xs: &[ArrayD<f64>]) -> Vec<ArrayD<f64>> {
        vec![xs[0].mapv(f64::recip)]
    }
    fn backward(&self, xs: &[Variable], gys: &[Variable]) -> Vec<Variable> {
        // d/dx (1/x) = -(1/x)^2
        let y = reciprocal(&xs[0]);
        vec![&neg(&gys[0]) * &(&y * &y)]
    }
    fn name(&self) -> &str { "Reciprocal" }
}

// --- 구간별 선형 함수 ---
// relu, abs의 도함수(step, sign)는 거의 모든 점에서 기울기가 0
// 그래도 zeros_like(x)로 x와 연결을 유지해서 몇 차 미분이든 x까지 도달하게 한다

struct ReluFn;

impl Function for ReluFn {
    fn forward(&self, xs: &[ArrayD<f64>]) -> Vec<ArrayD<f64>> {
        vec![xs[0].mapv(|x| x.max(0.0))]
    }
    fn backward(&self, xs: &[Variable], gys: &[Variable]) -> Vec<Variable> {
        vec![&step(&xs[0]) * &gys[0]]
    }
    fn name(&self) -> &str { "Relu" }
}

/// x > 0 이면 1, 아니면 0
struct StepFn;

impl Function for StepFn {
    fn forward(&self, xs: &[ArrayD<f64>]) -> Vec<ArrayD<f64>> {
        vec![xs[0].mapv(|x| if x > 0.0 { 1.0 } else { 0.0 })]
    }
    fn backward(&self, xs: &[Variable], _gys: &[Variable]) -> Vec<Variable> {
        vec![zeros_like(&xs[0])]
    }
    fn name(&self) -> &str { "Step" }
}

struct AbsFn;

impl Function for AbsFn {
    fn forward(&self, xs: &[ArrayD<f64>]) -> Vec<ArrayD<f64>> {
        vec![xs[0].mapv(f64::abs)]
    }
    fn backward(&self, xs: &[Variable], gys: &[Variable]) -> Vec<Variable> {
        vec![&sign(&xs[0]) * &gys[0]]
    }
    fn name(&self) -> &str { "Abs" }
}

struct SignFn;

impl Function for SignFn {
    fn forward(&self, xs: &[ArrayD<f64>]) -> Vec<ArrayD<f64>> {
        // f64::signum은 0.0에서 1.0을 돌려주므로 직접 처리
        vec![xs[0].mapv(|x| {
            if x > 0.0 {
                1.0
            } else if x < 0.0 {
                -1.0
            } else {
                0.0
            }
        })]
    }
    fn backward(&self, xs: &[Variable], _gys: &[Variable]) -> Vec<Variable> {
        vec![zeros_like(&xs[0])]
    }
    fn name(&self) -> &str { "Sign" }
}

struct ZerosLikeFn;

impl Function for ZerosLikeFn {
    fn forward(&self, xs: &[ArrayD<f64>]) -> Vec<ArrayD<f64>> {
        vec![ArrayD::zeros(xs[0].raw_dim())]
    }
    fn backward(&self, xs: &[Variable], _gys: &[Variable]) -> Vec<Variable> {
        vec![zeros_like(&xs[0])]
    }
    fn name(&self) -> &str { "ZerosLike" }
}

// --- sigmoid ---

struct SigmoidFn;

impl Function for SigmoidFn {
    fn forward(&self, xs: &[ArrayD<f64>]) -> Vec<ArrayD<f64>> {
        vec![xs[0].mapv(|x| 1.0 / (1.0 + (-x).exp()))]
    }
    fn backward(&self, xs: &[Variable], gys: &[Variable]) -> Vec<Variable> {
        // sigmoid'(x) = s(1 - s), s는 다시 미분할 수 있도록 Variable로 계산
        let s = sigmoid(&xs[0]);
        vec![&gys[0] * &(&s * &(1.0 - &s))]
    }
    fn name(&self) -> &str { "Sigmoid" }
}

// --- 공개 함수 ---

pub fn neg(x: &Variable) -> Variable {
    Func::new(NegFn).call(&[x])
}

pub fn add(x0: &Variable, x1: &Variable) -> Variable {
    Func::new(AddFn).call(&[x0, x1])
}

pub fn sub(x0: &Variable, x1: &Variable) -> Variable {
    Func::new(SubFn).call(&[x0, x1])
}

pub fn mul(x0: &Variable, x1: &Variable) -> Variable {
    Func::new(MulFn).call(&[x0, x1])
}

pub fn div(x0: &Variable, x1: &Variable) -> Variable {
    Func::new(DivFn).call(&[x0, x1])
}

pub fn powfn(x: &Variable, c: f64) -> Variable {
    Func::new(PowFn { c }).call(&[x])
}

pub fn sin(x: &Variable) -> Variable {
    Func::new(SinFn).call(&[x])
}

pub fn cos(x: &Variable) -> Variable {
    Func::new(CosFn).call(&[x])
}

pub fn relu(x: &Variable) -> Variable {
    Func::new(ReluFn).call(&[x])
}

pub fn step(x: &Variable) -> Variable {
    Func::new(StepFn).call(&[x])
}

pub fn log(x: &Variable) -> Variable {
    Func::new(LogFn).call(&[x])
}

pub fn log2(x: &Variable) -> Variable {
    Func::new(LogBaseFn { ln_base: LN_2, name: "Log2" }).call(&[x])
}

pub fn log10(x: &Variable) -> Variable {
    Func::new(LogBaseFn { ln_base: LN_10, name: "Log10" }).call(&[x])
}

pub fn reciprocal(x: &Variable) -> Variable {
    Func::new(ReciprocalFn).call(&[x])
}

pub fn abs(x: &Variable) -> Variable {
    Func::new(AbsFn).call(&[x])
}

pub fn sign(x: &Variable) -> Variable {
    Func::new(SignFn).call(&[x])
}

pub fn sigmoid(x: &Variable) -> Variable {
    Func::new(SigmoidFn).call(&[x])
}

/// x와 같은 모양의 0 텐서, 그래프상으로는 x에 연결된다
pub fn zeros_like(x: &Variable) -> Variable {
    Func::new(ZerosLikeFn).call(&[x])
}
