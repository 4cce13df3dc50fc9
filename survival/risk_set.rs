use crate::error::SurvivalError;

/// Subjects still under observation at each distinct event time.
///
/// Event times are strictly ascending. A subject is at risk at `t` when its
/// observed time is `>= t`, so subjects with an event exactly at `t` are in
/// the risk set for `t` (Breslow handling of ties).
#[derive(Debug, Clone, PartialEq)]
pub struct RiskSets {
    event_times: Vec<f64>,
    members: Vec<Vec<usize>>,
    events: Vec<Vec<usize>>,
}

/// One entry of [`RiskSets`].
#[derive(Debug, Clone, Copy)]
pub struct RiskSet<'a> {
    pub time: f64,
    /// Indices of subjects at risk.
    pub members: &'a [usize],
    /// Indices of subjects whose event happened exactly at `time`.
    pub events: &'a [usize],
}

impl RiskSets {
    pub fn build(times: &[f64], event_occurred: &[bool]) -> Result<Self, SurvivalError> {
        if times.len() != event_occurred.len() {
            return Err(SurvivalError::DimensionMismatch);
        }
        if times.iter().any(|t| !t.is_finite()) {
            return Err(SurvivalError::NonFiniteInput {
                field: "time_to_event",
            });
        }

        let mut event_times: Vec<f64> = times
            .iter()
            .zip(event_occurred)
            .filter(|&(_, &event)| event)
            .map(|(&t, _)| t)
            .collect();
        event_times.sort_by(f64::total_cmp);
        event_times.dedup();

        let members = event_times
            .iter()
            .map(|&t| {
                (0..times.len())
                    .filter(|&i| times[i] >= t)
                    .collect::<Vec<_>>()
            })
            .collect();
        let events = event_times
            .iter()
            .map(|&t| {
                (0..times.len())
                    .filter(|&i| event_occurred[i] && times[i] == t)
                    .collect::<Vec<_>>()
            })
            .collect();

        Ok(Self {
            event_times,
            members,
            events,
        })
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.event_times.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.event_times.is_empty()
    }

    pub fn event_times(&self) -> &[f64] {
        &self.event_times
    }

    /// Total number of observed events across all times.
    pub fn num_events(&self) -> usize {
        self.events.iter().map(Vec::len).sum()
    }

    pub fn get(&self, idx: usize) -> Option<RiskSet<'_>> {
        Some(RiskSet {
            time: *self.event_times.get(idx)?,
            members: self.members.get(idx)?,
            events: self.events.get(idx)?,
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = RiskSet<'_>> + '_ {
        (0..self.len()).filter_map(move |idx| self.get(idx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn risk_sets_follow_event_times() {
        let times = [5.0, 3.0, 8.0, 3.0, 10.0];
        let events = [true, true, false, true, true];
        let sets = RiskSets::build(&times, &events).unwrap();

        assert_eq!(sets.event_times(), &[3.0, 5.0, 10.0]);
        let first = sets.get(0).unwrap();
        assert_eq!(first.members, &[0, 1, 2, 3, 4]);
        assert_eq!(first.events, &[1, 3]);
        let second = sets.get(1).unwrap();
        assert_eq!(second.members, &[0, 2, 4]);
        assert_eq!(second.events, &[0]);
        let third = sets.get(2).unwrap();
        assert_eq!(third.members, &[4]);
        assert_eq!(sets.num_events(), 4);
    }

    #[test]
    fn censored_subjects_never_key_a_risk_set() {
        let sets = RiskSets::build(&[1.0, 2.0, 4.0], &[false, true, false]).unwrap();
        assert_eq!(sets.event_times(), &[2.0]);
        assert_eq!(sets.get(0).unwrap().members, &[1, 2]);
    }

    #[test]
    fn no_events_yields_empty_mapping() {
        let sets = RiskSets::build(&[1.0, 2.0], &[false, false]).unwrap();
        assert!(sets.is_empty());
        assert_eq!(sets.iter().count(), 0);
    }

    #[test]
    fn later_risk_sets_are_subsets() {
        let times = [7.0, 2.0, 9.0, 4.0, 4.0, 12.0, 1.0, 6.0];
        let events = [true, false, true, true, true, false, true, true];
        let sets = RiskSets::build(&times, &events).unwrap();
        let all: Vec<_> = sets.iter().collect();
        for pair in all.windows(2) {
            assert!(pair[0].time < pair[1].time);
            assert!(pair[1].members.iter().all(|m| pair[0].members.contains(m)));
        }
    }

    #[test]
    fn mismatched_lengths_are_rejected() {
        assert_eq!(
            RiskSets::build(&[1.0, 2.0], &[true]).unwrap_err(),
            SurvivalError::DimensionMismatch
        );
    }
}
