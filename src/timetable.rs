// Copyright 2020 by Michael Thies <mail@mhthies.de>
//
// Licensed under the Apache License, Version 2.0 (the "License"); you may not use this file except in compliance with
// the License. You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software distributed under the License is distributed on an
// "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied. See the License for the
// specific language governing permissions and limitations under the License.

//! The mutable solution state: an exam-to-(period, room) assignment with incrementally
//! maintained derived indices.

use crate::error::InvariantViolation;
use crate::problem::ProblemData;
use rand::Rng;
use std::sync::Arc;

/// One exam's placement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placement {
    pub period: u32,
    pub room: u32,
}

#[derive(Debug, Clone, Copy, Default)]
struct RoomOccupancy {
    seats_used: u32,
    num_exams: u32,
}

/// A (possibly incomplete) assignment of exams to periods and rooms, with the bookkeeping
/// needed to evaluate and mutate it in O(1)/O(period size) rather than O(num_exams).
#[derive(Debug, Clone)]
pub struct Timetable {
    data: Arc<ProblemData>,
    assign: Vec<Option<Placement>>,
    /// `period_exams[t]` = exams (with their room) currently placed in period `t`
    period_exams: Vec<Vec<(u32, u32)>>,
    /// `room_occupancy[r * num_periods + t]`
    room_occupancy: Vec<RoomOccupancy>,
    /// soft cost cache; valid only when `is_feasible()` (callers otherwise must not rely on it)
    pub(crate) cost: f64,
}

impl Timetable {
    /// An empty timetable with no exam scheduled.
    pub fn new(data: Arc<ProblemData>) -> Self {
        let num_exams = data.num_exams();
        let num_periods = data.num_periods();
        let num_rooms = data.num_rooms();
        Timetable {
            period_exams: vec![Vec::new(); num_periods],
            room_occupancy: vec![RoomOccupancy::default(); num_rooms * num_periods],
            assign: vec![None; num_exams],
            data,
            cost: 0.0,
        }
    }

    pub fn problem(&self) -> &Arc<ProblemData> {
        &self.data
    }

    #[inline]
    fn occ_index(&self, room: u32, period: u32) -> usize {
        room as usize * self.data.num_periods() + period as usize
    }

    /// The cached soft cost. Only meaningful once it has been initialized via `full_cost` or
    /// maintained incrementally through `KempeMove::apply`.
    pub fn cost(&self) -> f64 {
        self.cost
    }

    pub fn is_scheduled(&self, exam: u32) -> bool {
        self.assign[exam as usize].is_some()
    }

    pub fn is_complete(&self) -> bool {
        self.assign.iter().all(Option::is_some)
    }

    pub fn placement_of(&self, exam: u32) -> Option<Placement> {
        self.assign[exam as usize]
    }

    pub fn period_of(&self, exam: u32) -> Option<u32> {
        self.assign[exam as usize].map(|p| p.period)
    }

    pub fn room_of(&self, exam: u32) -> Option<u32> {
        self.assign[exam as usize].map(|p| p.room)
    }

    pub fn period_exams(&self, period: u32) -> &[(u32, u32)] {
        &self.period_exams[period as usize]
    }

    pub fn seats_used(&self, room: u32, period: u32) -> u32 {
        self.room_occupancy[self.occ_index(room, period)].seats_used
    }

    pub fn exams_in(&self, room: u32, period: u32) -> u32 {
        self.room_occupancy[self.occ_index(room, period)].num_exams
    }

    /// Schedule `exam` into `(period, room)`. Panics (debug) if already scheduled.
    pub fn schedule(&mut self, exam: u32, period: u32, room: u32) {
        debug_assert!(
            self.assign[exam as usize].is_none(),
            "exam {} already scheduled",
            exam
        );
        self.assign[exam as usize] = Some(Placement { period, room });
        self.period_exams[period as usize].push((exam, room));
        let idx = self.occ_index(room, period);
        self.room_occupancy[idx].seats_used += self.data.exams[exam as usize].num_students;
        self.room_occupancy[idx].num_exams += 1;
    }

    /// Remove `exam` from the timetable. Panics (debug) if not scheduled.
    pub fn unschedule(&mut self, exam: u32) {
        let placement = self.assign[exam as usize]
            .take()
            .unwrap_or_else(|| panic!("exam {} not scheduled", exam));
        let list = &mut self.period_exams[placement.period as usize];
        let pos = list
            .iter()
            .position(|&(e, _)| e == exam)
            .expect("period_exams out of sync with assign");
        list.swap_remove(pos);
        let idx = self.occ_index(placement.room, placement.period);
        self.room_occupancy[idx].seats_used -= self.data.exams[exam as usize].num_students;
        self.room_occupancy[idx].num_exams -= 1;
    }

    /// Atomically empty period `period` and schedule `new_exams` (exam, room pairs) into it.
    /// Used by Kempe move commit/rollback to replace a period's contents in one step.
    pub fn replace_period(&mut self, period: u32, new_exams: &[(u32, u32)]) {
        let current: Vec<u32> = self.period_exams[period as usize]
            .iter()
            .map(|&(e, _)| e)
            .collect();
        for exam in current {
            self.unschedule(exam);
        }
        for &(exam, room) in new_exams {
            self.schedule(exam, period, room);
        }
    }

    /// Whether `room` can additionally accommodate `exam` during `period`: capacity allows it
    /// and no `RoomExclusive` constraint (on `exam` or on an existing occupant) is violated.
    pub fn room_admits(&self, exam: u32, period: u32, room: u32) -> bool {
        let exam_data = &self.data.exams[exam as usize];
        if exam_data.duration > self.data.periods[period as usize].duration {
            return false;
        }
        let occupants = &self.period_exams[period as usize];
        let current_in_room: Vec<u32> = occupants
            .iter()
            .filter(|&&(_, r)| r == room)
            .map(|&(e, _)| e)
            .collect();
        if !current_in_room.is_empty() {
            let exam_exclusive = self
                .data
                .constraints_for(exam)
                .iter()
                .any(|c| matches!(c, crate::problem::HardConstraint::RoomExclusive { exam: e } if *e == exam));
            if exam_exclusive {
                return false;
            }
            for &other in &current_in_room {
                let other_exclusive = self
                    .data
                    .constraints_for(other)
                    .iter()
                    .any(|c| matches!(c, crate::problem::HardConstraint::RoomExclusive { exam: e } if *e == other));
                if other_exclusive {
                    return false;
                }
            }
        }
        let seats = self.seats_used(room, period) + exam_data.num_students;
        seats <= self.data.rooms[room as usize].capacity
    }

    /// A uniformly random room admitting `exam` into `period`, or `None` if none exists.
    pub fn room_for<R: Rng + ?Sized>(
        &self,
        exam: u32,
        period: u32,
        rng: &mut R,
    ) -> Option<u32> {
        let mut candidates: Vec<u32> = (0..self.data.num_rooms() as u32)
            .filter(|&r| self.room_admits(exam, period, r))
            .collect();
        if candidates.is_empty() {
            return None;
        }
        let idx = rng.gen_range(0..candidates.len());
        Some(candidates.swap_remove(idx))
    }

    /// True iff no `No-Conflicts` violation exists within `period`.
    pub fn period_is_conflict_free(&self, period: u32) -> bool {
        let occupants = &self.period_exams[period as usize];
        for i in 0..occupants.len() {
            for j in (i + 1)..occupants.len() {
                if self.data.conflict(occupants[i].0, occupants[j].0) > 0 {
                    return false;
                }
            }
        }
        true
    }

    /// Check all hard constraints (§I2, I3, I4, I5) for the exams in `periods`; used after a
    /// tentative Kempe move to decide feasibility without a full-timetable scan.
    pub fn periods_are_feasible(&self, periods: &[u32]) -> bool {
        for &t in periods {
            if !self.period_is_conflict_free(t) {
                return false;
            }
        }
        for room in 0..self.data.num_rooms() as u32 {
            for &t in periods {
                let idx = self.occ_index(room, t);
                if self.room_occupancy[idx].seats_used > self.data.rooms[room as usize].capacity {
                    return false;
                }
            }
        }
        for &t in periods {
            for &(exam, _) in &self.period_exams[t as usize] {
                if self.data.exams[exam as usize].duration > self.data.periods[t as usize].duration {
                    return false;
                }
            }
        }
        for constraint in self.data.all_constraints() {
            if !self.constraint_is_satisfied(*constraint) {
                return false;
            }
        }
        true
    }

    fn constraint_is_satisfied(&self, constraint: crate::problem::HardConstraint) -> bool {
        use crate::problem::HardConstraint::*;
        match constraint {
            After { exam1, exam2 } => match (self.period_of(exam1), self.period_of(exam2)) {
                (Some(p1), Some(p2)) => p1 > p2,
                _ => true,
            },
            Coincidence { exam1, exam2 } => {
                if self.data.conflict(exam1, exam2) > 0 {
                    return true;
                }
                match (self.period_of(exam1), self.period_of(exam2)) {
                    (Some(p1), Some(p2)) => p1 == p2,
                    _ => true,
                }
            }
            Exclusion { exam1, exam2 } => match (self.period_of(exam1), self.period_of(exam2)) {
                (Some(p1), Some(p2)) => p1 != p2,
                _ => true,
            },
            RoomExclusive { exam } => match self.placement_of(exam) {
                Some(p) => self.exams_in(p.room, p.period) == 1,
                None => true,
            },
        }
    }

    /// Full hard-feasibility check over the whole timetable (§P1-P5). Intended for tests and
    /// debug assertions, not the hot path.
    pub fn is_feasible(&self) -> bool {
        if !self.is_complete() {
            return false;
        }
        let all_periods: Vec<u32> = (0..self.data.num_periods() as u32).collect();
        self.periods_are_feasible(&all_periods)
    }

    /// Re-derive `room_occupancy` from `period_exams` and compare against the cached counters,
    /// and check that no exam appears in more than one period (I6). Intended for debug-build
    /// assertions after a batch of mutations, not the hot path.
    pub(crate) fn check_invariants(&self) -> Result<(), InvariantViolation> {
        let mut seen = vec![false; self.data.num_exams()];
        for period in &self.period_exams {
            for &(exam, _) in period {
                if seen[exam as usize] {
                    return Err(InvariantViolation::DoubleScheduled { exam });
                }
                seen[exam as usize] = true;
            }
        }

        for room in 0..self.data.num_rooms() as u32 {
            for period in 0..self.data.num_periods() as u32 {
                let occupants: Vec<u32> = self.period_exams[period as usize]
                    .iter()
                    .filter(|&&(_, r)| r == room)
                    .map(|&(e, _)| e)
                    .collect();
                let expected_seats: u32 = occupants
                    .iter()
                    .map(|&e| self.data.exams[e as usize].num_students)
                    .sum();
                let cached = &self.room_occupancy[self.occ_index(room, period)];
                if cached.seats_used != expected_seats || cached.num_exams != occupants.len() as u32
                {
                    return Err(InvariantViolation::RoomOccupancyMismatch {
                        room,
                        period,
                        actual: cached.seats_used,
                        expected: expected_seats,
                    });
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::problem::{Exam, FrontLoad, HardConstraint, Period, ProblemData, Room, Weightings};
    use chrono::NaiveDate;

    fn weightings() -> Weightings {
        Weightings {
            two_in_a_row: 1,
            two_in_a_day: 1,
            period_spread: 1,
            non_mixed_durations: 1,
            front_load: FrontLoad {
                num_large_exams: 1,
                num_last_periods: 1,
                weight: 1,
            },
        }
    }

    fn sample_problem(constraints: Vec<HardConstraint>) -> Arc<ProblemData> {
        let exams = vec![
            Exam {
                index: 0,
                num_students: 2,
                duration: 60,
            },
            Exam {
                index: 1,
                num_students: 2,
                duration: 60,
            },
        ];
        let dt = NaiveDate::from_ymd_opt(2020, 1, 1)
            .unwrap()
            .and_hms_opt(9, 0, 0)
            .unwrap();
        let periods = vec![
            Period {
                index: 0,
                date_time: dt,
                duration: 60,
                penalty: 0,
            },
            Period {
                index: 1,
                date_time: dt,
                duration: 60,
                penalty: 0,
            },
        ];
        let rooms = vec![Room {
            index: 0,
            capacity: 2,
            penalty: 0,
        }];
        let matrix = vec![0, 1, 1, 0];
        Arc::new(ProblemData::new(
            exams,
            periods,
            rooms,
            weightings(),
            matrix,
            constraints,
        ))
    }

    #[test]
    fn schedule_and_unschedule_roundtrip() {
        let data = sample_problem(vec![]);
        let mut tt = Timetable::new(data);
        tt.schedule(0, 0, 0);
        assert!(tt.is_scheduled(0));
        assert_eq!(tt.seats_used(0, 0), 2);
        tt.unschedule(0);
        assert!(!tt.is_scheduled(0));
        assert_eq!(tt.seats_used(0, 0), 0);
    }

    #[test]
    fn conflicting_exams_in_same_period_violate_p2() {
        let data = sample_problem(vec![]);
        let mut tt = Timetable::new(data);
        tt.schedule(0, 0, 0);
        tt.schedule(1, 0, 0);
        assert!(!tt.period_is_conflict_free(0));
    }

    #[test]
    fn room_exclusive_blocks_sharing() {
        let data = sample_problem(vec![HardConstraint::RoomExclusive { exam: 0 }]);
        let mut tt = Timetable::new(data);
        tt.schedule(0, 0, 0);
        assert!(!tt.room_admits(1, 0, 0));
    }

    #[test]
    fn period_utilisation_violation_is_infeasible() {
        let exams = vec![Exam {
            index: 0,
            num_students: 1,
            duration: 90,
        }];
        let dt = NaiveDate::from_ymd_opt(2020, 1, 1)
            .unwrap()
            .and_hms_opt(9, 0, 0)
            .unwrap();
        let periods = vec![Period {
            index: 0,
            date_time: dt,
            duration: 60,
            penalty: 0,
        }];
        let rooms = vec![Room {
            index: 0,
            capacity: 10,
            penalty: 0,
        }];
        let data = Arc::new(ProblemData::new(
            exams,
            periods,
            rooms,
            weightings(),
            vec![0],
            vec![],
        ));
        let mut tt = Timetable::new(data);
        tt.schedule(0, 0, 0);
        assert!(!tt.periods_are_feasible(&[0]));
    }

    #[test]
    fn check_invariants_passes_on_consistent_state() {
        let data = sample_problem(vec![]);
        let mut tt = Timetable::new(data);
        tt.schedule(0, 0, 0);
        tt.schedule(1, 1, 0);
        assert!(tt.check_invariants().is_ok());
    }

    #[test]
    fn check_invariants_detects_room_occupancy_corruption() {
        let data = sample_problem(vec![]);
        let mut tt = Timetable::new(data);
        tt.schedule(0, 0, 0);
        let idx = tt.occ_index(0, 0);
        tt.room_occupancy[idx].seats_used += 1;
        assert!(matches!(
            tt.check_invariants(),
            Err(InvariantViolation::RoomOccupancyMismatch { .. })
        ));
    }

    #[test]
    fn replace_period_is_atomic() {
        let data = sample_problem(vec![]);
        let mut tt = Timetable::new(data);
        tt.schedule(0, 0, 0);
        tt.replace_period(0, &[(1, 0)]);
        assert!(!tt.is_scheduled(0));
        assert!(tt.is_scheduled(1));
        assert_eq!(tt.period_of(1), Some(0));
    }
}
