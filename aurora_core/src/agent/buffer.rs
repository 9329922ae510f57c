/// One actor batch of on-policy experience.
///
/// `episode_starts[t]` marks observations that opened an episode; GAE cuts
/// bootstrapping at those boundaries, so a segment may span several episodes.
#[derive(Debug, Default, Clone)]
pub struct RolloutBuffer {
    pub observations: Vec<Vec<f32>>,
    pub actions: Vec<Vec<f32>>,
    pub rewards: Vec<f32>,
    pub values: Vec<f32>,
    pub episode_starts: Vec<bool>,
    pub log_probs: Vec<f32>,
    pub advantages: Vec<f32>,
    pub returns: Vec<f32>,
}

impl RolloutBuffer {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            observations: Vec::with_capacity(capacity),
            actions: Vec::with_capacity(capacity),
            rewards: Vec::with_capacity(capacity),
            values: Vec::with_capacity(capacity),
            episode_starts: Vec::with_capacity(capacity),
            log_probs: Vec::with_capacity(capacity),
            advantages: Vec::new(),
            returns: Vec::new(),
        }
    }

    pub fn push(
        &mut self,
        obs: Vec<f32>,
        action: Vec<f32>,
        reward: f32,
        value: f32,
        episode_start: bool,
        log_prob: f32,
    ) {
        self.observations.push(obs);
        self.actions.push(action);
        self.rewards.push(reward);
        self.values.push(value);
        self.episode_starts.push(episode_start);
        self.log_probs.push(log_prob);
    }

    pub fn len(&self) -> usize {
        self.rewards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rewards.is_empty()
    }

    /// GAE(lambda) advantages and TD(lambda) returns.
    ///
    /// `last_value` is the value of the observation following the segment and
    /// `last_episode_start` says whether that observation opened a new episode
    /// (in which case it is not bootstrapped from).
    pub fn finish_path(&mut self, gamma: f32, lambda: f32, last_value: f32, last_episode_start: bool) {
        let len = self.len();
        self.advantages = vec![0.0; len];
        let mut last_gae = 0.0f32;
        for t in (0..len).rev() {
            let (next_value, next_start) = if t + 1 < len {
                (self.values[t + 1], self.episode_starts[t + 1])
            } else {
                (last_value, last_episode_start)
            };
            let non_terminal = if next_start { 0.0 } else { 1.0 };
            let delta = self.rewards[t] + gamma * next_value * non_terminal - self.values[t];
            last_gae = delta + gamma * lambda * non_terminal * last_gae;
            self.advantages[t] = last_gae;
        }
        self.returns = self
            .advantages
            .iter()
            .zip(&self.values)
            .map(|(adv, value)| adv + value)
            .collect();
    }

    /// Standardises advantages over the whole segment.
    pub fn normalize_advantages(&mut self) {
        if self.advantages.is_empty() {
            return;
        }
        let n = self.advantages.len() as f32;
        let mean = self.advantages.iter().sum::<f32>() / n;
        let variance = self.advantages.iter().map(|x| (x - mean).powi(2)).sum::<f32>() / n;
        let std = (variance + 1e-8).sqrt();
        for adv in &mut self.advantages {
            *adv = (*adv - mean) / std;
        }
    }

    pub fn clear(&mut self) {
        self.observations.clear();
        self.actions.clear();
        self.rewards.clear();
        self.values.clear();
        self.episode_starts.clear();
        self.log_probs.clear();
        self.advantages.clear();
        self.returns.clear();
    }
}
