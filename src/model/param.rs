use crate::math::tensor::Tensor;

/// A trainable parameter: full-precision master value plus its gradient
/// accumulation buffer.
#[derive(Debug, Clone)]
pub struct Param {
    pub name: String,
    pub value: Tensor,
    pub grad: Tensor,
}

impl Param {
    pub fn new(name: impl Into<String>, value: Tensor) -> Param {
        let grad = Tensor::zeros(&value.shape);
        Param { name: name.into(), value, grad }
    }

    pub fn zero_grad(&mut self) {
        self.grad.fill(0.0);
    }
}
