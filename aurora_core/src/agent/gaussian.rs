// Diagonal Gaussian helpers shared by the agent and the serving policy.
use rand::Rng;

const LN_2PI: f32 = 1.837_877_1;

/// Standard normal sample via Box-Muller.
pub fn standard_normal<R: Rng>(rng: &mut R) -> f32 {
    let u1: f32 = rng.gen_range(f32::EPSILON..1.0);
    let u2: f32 = rng.gen();
    (-2.0 * u1.ln()).sqrt() * (2.0 * std::f32::consts::PI * u2).cos()
}

pub fn sample<R: Rng>(mean: &[f32], log_std: &[f32], rng: &mut R) -> Vec<f32> {
    mean.iter()
        .zip(log_std)
        .map(|(mu, ls)| mu + ls.exp() * standard_normal(rng))
        .collect()
}

pub fn log_prob(action: &[f32], mean: &[f32], log_std: &[f32]) -> f32 {
    let k = mean.len() as f32;
    let mut quad = 0.0;
    let mut log_det = 0.0;
    for ((a, mu), ls) in action.iter().zip(mean).zip(log_std) {
        let z = (a - mu) / ls.exp();
        quad += z * z;
        log_det += ls;
    }
    -0.5 * quad - log_det - 0.5 * k * LN_2PI
}
