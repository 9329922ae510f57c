use std::ops::{Deref, DerefMut};

use crate::env::Environment;
use crate::error::Result;

/// Owns an environment session and closes it exactly once.
///
/// [`SessionGuard::close`] consumes the guard and reports the close result;
/// a guard dropped on any other path (early return, `?`, panic unwind) closes
/// the session from `Drop` and logs a failure instead.
pub struct SessionGuard<E: Environment> {
    env: Option<E>,
}

impl<E: Environment> SessionGuard<E> {
    pub fn new(env: E) -> Self {
        Self { env: Some(env) }
    }

    pub fn close(mut self) -> Result<()> {
        match self.env.take() {
            Some(mut env) => env.close(),
            None => Ok(()),
        }
    }
}

impl<E: Environment> Deref for SessionGuard<E> {
    type Target = E;

    fn deref(&self) -> &E {
        // `env` is only taken by `close(self)`, which consumes the guard.
        self.env.as_ref().unwrap_or_else(|| unreachable!("session already closed"))
    }
}

impl<E: Environment> DerefMut for SessionGuard<E> {
    fn deref_mut(&mut self) -> &mut E {
        self.env.as_mut().unwrap_or_else(|| unreachable!("session already closed"))
    }
}

impl<E: Environment> Drop for SessionGuard<E> {
    fn drop(&mut self) {
        if let Some(mut env) = self.env.take() {
            if let Err(e) = env.close() {
                tracing::error!("failed to close environment session: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::{Space, StepResult};
    use crate::error::AuroraError;
    use std::cell::Cell;
    use std::rc::Rc;

    struct Counting {
        closes: Rc<Cell<usize>>,
        space: Space,
    }

    impl Environment for Counting {
        fn observation_space(&self) -> &Space {
            &self.space
        }
        fn action_space(&self) -> &Space {
            &self.space
        }
        fn reset(&mut self) -> Result<Vec<f32>> {
            Ok(vec![0.0])
        }
        fn step(&mut self, _action: &[f32]) -> Result<StepResult> {
            Err(AuroraError::EpisodeFinished)
        }
        fn close(&mut self) -> Result<()> {
            self.closes.set(self.closes.get() + 1);
            Ok(())
        }
    }

    fn counting() -> (Counting, Rc<Cell<usize>>) {
        let closes = Rc::new(Cell::new(0));
        let env = Counting {
            closes: closes.clone(),
            space: Space::Discrete { n: 2 },
        };
        (env, closes)
    }

    #[test]
    fn test_explicit_close_runs_once() {
        let (env, closes) = counting();
        let guard = SessionGuard::new(env);
        guard.close().unwrap();
        assert_eq!(closes.get(), 1);
    }

    #[test]
    fn test_drop_closes_on_error_path() {
        let (env, closes) = counting();
        let run = || -> Result<()> {
            let mut guard = SessionGuard::new(env);
            guard.reset()?;
            guard.step(&[0.0])?;
            guard.close()
        };
        assert!(run().is_err());
        assert_eq!(closes.get(), 1);
    }
}
