use super::protocol::Time;

/// A lockstep clock yielding simulation times over a fixed horizon.
///
/// Times start at zero and advance by `step_size` seconds while they stay
/// below `end`.
///
/// # Examples
///
/// ```
/// use pv_control_sim::sim::clock::Clock;
///
/// let mut clock = Clock::new(180, 60);
/// let mut times = Vec::new();
///
/// clock.run(|t| times.push(t));
/// assert_eq!(times, vec![0, 60, 120]);
/// ```
pub struct Clock {
    /// Next time to hand out
    current: Time,
    /// Exclusive end of the horizon
    end: Time,
    step_size: Time,
}

impl Clock {
    /// Creates a clock over `[0, end)` with the given step.
    ///
    /// A zero `step_size` yields no times.
    pub fn new(end: Time, step_size: Time) -> Self {
        Self {
            current: 0,
            end: if step_size == 0 { 0 } else { end },
            step_size,
        }
    }

    /// Number of times the clock yields in total.
    pub fn steps(&self) -> u64 {
        if self.step_size == 0 {
            0
        } else {
            self.end.div_ceil(self.step_size)
        }
    }

    /// Returns the next time and advances, or `None` past the horizon.
    pub fn tick(&mut self) -> Option<Time> {
        if self.current < self.end {
            let t = self.current;
            self.current += self.step_size;
            Some(t)
        } else {
            None
        }
    }

    /// Runs `f` for each remaining time.
    pub fn run(&mut self, mut f: impl FnMut(Time)) {
        while let Some(t) = self.tick() {
            f(t);
        }
    }
}
