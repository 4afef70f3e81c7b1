use crate::model::param::Param;
use crate::optim::optimizer::Optimizer;

pub struct Sgd {
    pub learning_rate: f32,
}

impl Sgd {
    pub fn new(learning_rate: f32) -> Sgd {
        Sgd { learning_rate }
    }
}

impl Optimizer for Sgd {
    /// Plain gradient descent: `w ← w - lr·g`.
    fn step(&mut self, params: &mut [&mut Param]) {
        for param in params.iter_mut() {
            let lr = self.learning_rate;
            for (w, g) in param.value.data.iter_mut().zip(&param.grad.data) {
                *w -= lr * g;
            }
        }
    }

    fn learning_rate(&self) -> f32 {
        self.learning_rate
    }
}
