/// One-bit thermostat latch with a symmetric deadband around the setpoint.
#[derive(Debug, Clone)]
pub struct HysteresisEngine {
    hysteresis_f: f32,
    heat_call: bool,
}

impl HysteresisEngine {
    pub fn new(hysteresis_f: f32) -> Self {
        Self {
            hysteresis_f,
            heat_call: false,
        }
    }

    pub fn heat_call(&self) -> bool {
        self.heat_call
    }

    pub fn hysteresis_f(&self) -> f32 {
        self.hysteresis_f
    }

    /// `room_temp_f` must be a real reading; callers gate on sensor availability.
    pub fn evaluate(&mut self, room_temp_f: f32, setpoint_f: f32) -> bool {
        if self.heat_call {
            if room_temp_f >= setpoint_f + self.hysteresis_f {
                self.heat_call = false;
            }
        } else if room_temp_f <= setpoint_f - self.hysteresis_f {
            self.heat_call = true;
        }
        self.heat_call
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn follows_reference_sequence() {
        let mut engine = HysteresisEngine::new(0.2);
        let calls: Vec<bool> = [69.0, 69.9, 70.3, 70.5]
            .into_iter()
            .map(|temp| engine.evaluate(temp, 70.0))
            .collect();

        assert_eq!(calls, vec![true, true, false, false]);
    }

    #[test]
    fn starts_without_heat_call() {
        let mut engine = HysteresisEngine::new(0.2);

        assert!(!engine.heat_call());
        assert!(!engine.evaluate(69.9, 70.0));
    }

    #[test]
    fn thresholds_are_inclusive() {
        let mut engine = HysteresisEngine::new(0.5);

        assert!(engine.evaluate(69.5, 70.0));
        assert!(!engine.evaluate(70.5, 70.0));
    }

    #[test]
    fn setpoint_change_moves_the_band() {
        let mut engine = HysteresisEngine::new(0.2);
        assert!(!engine.evaluate(70.0, 70.0));

        assert!(engine.evaluate(70.0, 72.0));
        assert!(!engine.evaluate(70.0, 68.0));
    }
}
