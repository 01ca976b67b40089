//! Parameter automation.

#[derive(Debug, Clone, Copy, PartialEq)]
struct Ramp {
    from: f32,
    to: f32,
    start_time: f64,
    end_time: f64,
}

/// A node parameter with at most one linear ramp in flight.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioParam {
    value: f32,
    ramp: Option<Ramp>,
}

impl AudioParam {
    pub const fn new(value: f32) -> Self {
        Self { value, ramp: None }
    }

    /// Value of the parameter at time `t`.
    pub fn value_at(&self, t: f64) -> f32 {
        let Some(ramp) = self.ramp else {
            return self.value;
        };
        if t >= ramp.end_time {
            ramp.to
        } else if t <= ramp.start_time {
            ramp.from
        } else {
            let progress = ((t - ramp.start_time) / (ramp.end_time - ramp.start_time)) as f32;
            (ramp.to - ramp.from).mul_add(progress, ramp.from)
        }
    }

    /// Jump to `value`, dropping any ramp.
    pub fn set(&mut self, value: f32) {
        self.value = value;
        self.ramp = None;
    }

    /// Ramp from the value at `now` to `value` at `end_time`.
    ///
    /// An `end_time` at or before `now` applies the value from `now` on.
    pub fn ramp_to(&mut self, value: f32, now: f64, end_time: f64) {
        let from = self.value_at(now);
        self.value = from;
        self.ramp = Some(Ramp {
            from,
            to: value,
            start_time: now,
            end_time: end_time.max(now),
        });
    }

    /// Collapse a finished ramp into a plain value.
    pub fn settle(&mut self, t: f64) {
        if let Some(ramp) = self.ramp {
            if t >= ramp.end_time {
                self.value = ramp.to;
                self.ramp = None;
            }
        }
    }
}
