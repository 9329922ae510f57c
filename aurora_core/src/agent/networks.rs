use burn::module::{Module, Param};
use burn::nn::{Linear, LinearConfig};
use burn::tensor::activation::tanh;
use burn::tensor::{backend::Backend, Tensor};

// Feed-forward policy and value networks. Both use the same hidden widths and
// tanh activations; an empty width list maps the input straight to the head.

fn hidden_stack<B: Backend>(input_size: usize, hidden: &[usize], device: &B::Device) -> (Vec<Linear<B>>, usize) {
    let mut in_features = input_size;
    let mut layers = Vec::with_capacity(hidden.len());
    for &width in hidden {
        layers.push(LinearConfig::new(in_features, width).init(device));
        in_features = width;
    }
    (layers, in_features)
}

/// Gaussian policy: the network produces the action mean and a
/// state-independent `log_std` gives the spread.
#[derive(Module, Debug)]
pub struct Actor<B: Backend> {
    layers: Vec<Linear<B>>,
    mean_head: Linear<B>,
    log_std: Param<Tensor<B, 1>>,
}

impl<B: Backend> Actor<B> {
    pub fn new(input_size: usize, hidden: &[usize], output_size: usize, device: &B::Device) -> Self {
        let (layers, in_features) = hidden_stack(input_size, hidden, device);
        let mean_head = LinearConfig::new(in_features, output_size).init(device);
        let log_std = Param::from_tensor(Tensor::zeros([output_size], device));
        Self {
            layers,
            mean_head,
            log_std,
        }
    }

    /// Action mean, `[batch, output_size]`.
    pub fn forward(&self, input: Tensor<B, 2>) -> Tensor<B, 2> {
        let mut x = input;
        for layer in self.layers.iter() {
            x = tanh(layer.forward(x));
        }
        self.mean_head.forward(x)
    }

    pub fn log_std(&self) -> Tensor<B, 1> {
        self.log_std.val()
    }

    /// Hidden layers followed by the mean head.
    pub fn dense_layers(&self) -> impl Iterator<Item = &Linear<B>> + '_ {
        self.layers.iter().chain(std::iter::once(&self.mean_head))
    }
}

#[derive(Module, Debug)]
pub struct Critic<B: Backend> {
    layers: Vec<Linear<B>>,
    value_head: Linear<B>,
}

impl<B: Backend> Critic<B> {
    pub fn new(input_size: usize, hidden: &[usize], device: &B::Device) -> Self {
        let (layers, in_features) = hidden_stack(input_size, hidden, device);
        let value_head = LinearConfig::new(in_features, 1).init(device);
        Self { layers, value_head }
    }

    /// State value, `[batch, 1]`.
    pub fn forward(&self, input: Tensor<B, 2>) -> Tensor<B, 2> {
        let mut x = input;
        for layer in self.layers.iter() {
            x = tanh(layer.forward(x));
        }
        self.value_head.forward(x)
    }
}

#[derive(Module, Debug)]
pub struct ActorCritic<B: Backend> {
    pub actor: Actor<B>,
    pub critic: Critic<B>,
}

impl<B: Backend> ActorCritic<B> {
    pub fn new(obs_size: usize, hidden: &[usize], action_size: usize, device: &B::Device) -> Self {
        Self {
            actor: Actor::new(obs_size, hidden, action_size, device),
            critic: Critic::new(obs_size, hidden, device),
        }
    }
}
