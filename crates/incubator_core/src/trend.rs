//! Tendência da temperatura (RISING/FALLING/STABLE).

use crate::types::{Sample, Trend};

/// Compara cada amostra com a imediatamente anterior.
///
/// Guarda apenas uma amostra; não existe histórico além dela.
#[derive(Debug, Clone, Default)]
pub struct TrendTracker {
    previous: Option<Sample>,
    /// Amostra de outra sessão (após reconexão) não serve de referência.
    reset_on_new_session: bool,
}

impl TrendTracker {
    pub fn new(reset_on_new_session: bool) -> Self {
        Self {
            previous: None,
            reset_on_new_session,
        }
    }

    /// Calcula a tendência de `sample` e passa a usá-la como referência.
    pub fn update(&mut self, sample: &Sample) -> Trend {
        let Some(previous) = self.previous else {
            self.previous = Some(*sample);
            return Trend::Stable;
        };

        // Entrega duplicada: não mexe na referência, nem inverte tendência
        if sample.is_duplicate_of(&previous) {
            return Trend::Stable;
        }

        if self.reset_on_new_session && sample.session != previous.session {
            self.previous = Some(*sample);
            return Trend::Stable;
        }

        self.previous = Some(*sample);
        compare(previous.value, sample.value)
    }

    /// Esquece a referência (ex.: conexão perdida).
    pub fn reset(&mut self) {
        self.previous = None;
    }

    pub fn previous_value(&self) -> Option<f64> {
        self.previous.map(|s| s.value)
    }
}

/// `current > previous` → `Rising`; `<` → `Falling`; `=` → `Stable`.
pub fn compare(previous: f64, current: f64) -> Trend {
    if current > previous {
        Trend::Rising
    } else if current < previous {
        Trend::Falling
    } else {
        Trend::Stable
    }
}

// ──────────────────────────────────────────────
// Testes
// ──────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn samples(values: &[f64]) -> Vec<Sample> {
        let start = Utc::now();
        values
            .iter()
            .enumerate()
            .map(|(i, &v)| Sample::new(v, start + Duration::seconds(i as i64), 1))
            .collect()
    }

    #[test]
    fn first_sample_is_stable() {
        let mut tracker = TrendTracker::new(true);
        assert_eq!(tracker.update(&samples(&[37.0])[0]), Trend::Stable);
    }

    #[test]
    fn follows_consecutive_values() {
        let mut tracker = TrendTracker::new(true);
        let trends: Vec<Trend> = samples(&[37.0, 37.5, 37.5, 37.2])
            .iter()
            .map(|s| tracker.update(s))
            .collect();
        assert_eq!(
            trends,
            vec![Trend::Stable, Trend::Rising, Trend::Stable, Trend::Falling]
        );
    }

    #[test]
    fn pure_comparison() {
        assert_eq!(compare(1.0, 2.0), Trend::Rising);
        assert_eq!(compare(2.0, 1.0), Trend::Falling);
        assert_eq!(compare(1.5, 1.5), Trend::Stable);
    }

    #[test]
    fn duplicate_delivery_does_not_flip_trend() {
        let mut tracker = TrendTracker::new(true);
        let s = samples(&[37.0, 37.4]);
        tracker.update(&s[0]);
        assert_eq!(tracker.update(&s[1]), Trend::Rising);
        assert_eq!(tracker.update(&s[1]), Trend::Stable);
        assert_eq!(tracker.previous_value(), Some(37.4));
    }

    #[test]
    fn reset_forgets_reference() {
        let mut tracker = TrendTracker::new(true);
        let s = samples(&[37.0, 38.0]);
        tracker.update(&s[0]);
        tracker.reset();
        assert_eq!(tracker.update(&s[1]), Trend::Stable);
    }

    #[test]
    fn new_session_starts_over_when_enabled() {
        let mut tracker = TrendTracker::new(true);
        let at = Utc::now();
        tracker.update(&Sample::new(37.0, at, 1));
        let after_gap = Sample::new(38.0, at + Duration::seconds(10), 2);
        assert_eq!(tracker.update(&after_gap), Trend::Stable);
    }

    #[test]
    fn new_session_keeps_value_when_disabled() {
        let mut tracker = TrendTracker::new(false);
        let at = Utc::now();
        tracker.update(&Sample::new(37.0, at, 1));
        let after_gap = Sample::new(38.0, at + Duration::seconds(10), 2);
        assert_eq!(tracker.update(&after_gap), Trend::Rising);
    }
}
