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

//! Saturation-degree graph colouring construction heuristic with conflict-based statistics.

use crate::error::InfeasibleConstruction;
use crate::problem::{HardConstraint, ProblemData};
use crate::timetable::Timetable;
use rand::Rng;
use std::collections::HashMap;
use std::sync::Arc;

/// A single "placing exam A at (t,r) displaced exam B from (t',r')" transition counter.
type CbsKey = (u32, u32, u32, u32, u32, u32);

/// Builds feasible timetables via saturation-degree construction, keeping a conflict-based
/// statistics table that persists across `construct()` calls so repeated unhelpful
/// displacements are progressively discouraged.
pub struct Constructor {
    cbs: HashMap<CbsKey, u32>,
}

impl Constructor {
    pub fn new() -> Self {
        Constructor {
            cbs: HashMap::new(),
        }
    }

    /// Build one feasible timetable for `data` from scratch.
    pub fn construct<R: Rng + ?Sized>(
        &mut self,
        data: Arc<ProblemData>,
        rng: &mut R,
    ) -> Result<Timetable, InfeasibleConstruction> {
        let num_exams = data.num_exams();
        let num_periods = data.num_periods();
        let mut tt = Timetable::new(Arc::clone(&data));

        // available[e][t] = true iff period t is still a candidate for exam e
        let mut available = vec![vec![true; num_periods]; num_exams];
        self.restrict_after_chains(&data, &mut available);

        let mut available_count: Vec<usize> = available
            .iter()
            .map(|row| row.iter().filter(|&&b| b).count())
            .collect();
        let mut unscheduled: Vec<u32> = (0..num_exams as u32).collect();

        while let Some(exam) = self.pop_most_constrained(&mut unscheduled, &available_count, rng) {
            let displaced =
                self.place_exam(&data, &mut tt, exam, &available[exam as usize], rng)?;
            self.propagate(&data, &tt, exam, &mut available, &mut available_count);
            for d in displaced {
                unscheduled.push(d);
            }
        }

        Ok(tt)
    }

    /// Pre-restrict periods made infeasible by `After` chains: if `e2 After e1`, `e2` cannot
    /// occupy the last period available to it, transitively along the chain.
    fn restrict_after_chains(&self, data: &ProblemData, available: &mut [Vec<bool>]) {
        let num_exams = data.num_exams();
        let mut successors: Vec<Vec<u32>> = vec![Vec::new(); num_exams];
        for c in data.all_constraints() {
            if let HardConstraint::After { exam1, exam2 } = *c {
                // exam1 after exam2: exam2 is a predecessor of exam1
                successors[exam2 as usize].push(exam1);
            }
        }
        // Iterate to a fixed point: repeatedly forbid the last remaining available period of a
        // predecessor's successors, for as long as anything changes.
        let mut changed = true;
        while changed {
            changed = false;
            for exam in 0..num_exams {
                let last_available = available[exam]
                    .iter()
                    .rposition(|&b| b);
                if let Some(last) = last_available {
                    for &succ in &successors[exam] {
                        if available[succ as usize][last] {
                            available[succ as usize][last] = false;
                            changed = true;
                        }
                    }
                }
            }
        }
    }

    fn pop_most_constrained<R: Rng + ?Sized>(
        &self,
        unscheduled: &mut Vec<u32>,
        available_count: &[usize],
        rng: &mut R,
    ) -> Option<u32> {
        if unscheduled.is_empty() {
            return None;
        }
        let min = unscheduled
            .iter()
            .map(|&e| available_count[e as usize])
            .min()
            .unwrap();
        let candidates: Vec<usize> = unscheduled
            .iter()
            .enumerate()
            .filter(|&(_, &e)| available_count[e as usize] == min)
            .map(|(i, _)| i)
            .collect();
        let pick = candidates[rng.gen_range(0..candidates.len())];
        Some(unscheduled.swap_remove(pick))
    }

    /// Place `exam`, returning any already-scheduled exams that had to be evicted and must be
    /// re-enqueued by the caller.
    fn place_exam<R: Rng + ?Sized>(
        &mut self,
        data: &Arc<ProblemData>,
        tt: &mut Timetable,
        exam: u32,
        available: &[bool],
        rng: &mut R,
    ) -> Result<Vec<u32>, InfeasibleConstruction> {
        let available_periods: Vec<u32> = available
            .iter()
            .enumerate()
            .filter(|&(_, &b)| b)
            .map(|(t, _)| t as u32)
            .collect();
        if available_periods.is_empty() {
            return Err(InfeasibleConstruction::NoFeasiblePeriod { exam });
        }

        // Attempt 1: direct placement into a uniformly random available period.
        let first_try = available_periods[rng.gen_range(0..available_periods.len())];
        if let Some(room) = tt.room_for(exam, first_try, rng) {
            tt.schedule(exam, first_try, room);
            return Ok(Vec::new());
        }

        // Attempt 2: pick the (period, room) minimising the CBS-weighted hard-conflict count.
        let mut best: Option<(u32, u32, Vec<u32>, u32)> = None; // (period, room, displaced, score)
        for &period in &available_periods {
            let period_data = &data.periods[period as usize];
            if data.exams[exam as usize].duration > period_data.duration {
                continue;
            }
            for room in 0..data.num_rooms() as u32 {
                if data.exams[exam as usize].num_students > data.rooms[room as usize].capacity {
                    continue;
                }
                let Some(displaced) = self.hard_conflicts(data, tt, exam, period, room) else {
                    continue;
                };
                let score: u32 = displaced
                    .iter()
                    .map(|&d| {
                        let d_period = tt.period_of(d).unwrap();
                        let d_room = tt.room_of(d).unwrap();
                        1 + self
                            .cbs
                            .get(&(exam, period, room, d, d_period, d_room))
                            .copied()
                            .unwrap_or(0)
                    })
                    .sum();
                let better = match &best {
                    None => true,
                    Some((_, _, _, best_score)) => score < *best_score,
                };
                if better {
                    best = Some((period, room, displaced, score));
                }
            }
        }

        let Some((period, room, displaced, _)) = best else {
            return Err(InfeasibleConstruction::NoFeasibleRoom { exam });
        };
        for &d in &displaced {
            let d_period = tt.period_of(d).unwrap();
            let d_room = tt.room_of(d).unwrap();
            tt.unschedule(d);
            *self
                .cbs
                .entry((exam, period, room, d, d_period, d_room))
                .or_insert(0) += 1;
        }
        tt.schedule(exam, period, room);
        Ok(displaced)
    }

    /// The minimal set of already-scheduled exams that must be evicted so that `exam` can be
    /// placed at `(period, room)` without violating any hard constraint. `None` if no such set
    /// exists (e.g. `exam` alone cannot fit in `room`'s capacity).
    fn hard_conflicts(
        &self,
        data: &ProblemData,
        tt: &Timetable,
        exam: u32,
        period: u32,
        room: u32,
    ) -> Option<Vec<u32>> {
        if data.exams[exam as usize].num_students > data.rooms[room as usize].capacity {
            return None;
        }
        let mut displaced: Vec<u32> = Vec::new();

        // No-Conflicts: any exam already in `period` that conflicts with `exam`.
        for &(other, _) in tt.period_exams(period) {
            if data.conflict(exam, other) > 0 && !displaced.contains(&other) {
                displaced.push(other);
            }
        }

        // RoomExclusive, either side.
        let exam_exclusive = data
            .constraints_for(exam)
            .iter()
            .any(|c| matches!(c, HardConstraint::RoomExclusive { exam: e } if *e == exam));
        let room_occupants: Vec<u32> = tt
            .period_exams(period)
            .iter()
            .filter(|&&(_, r)| r == room)
            .map(|&(e, _)| e)
            .collect();
        if exam_exclusive {
            for &other in &room_occupants {
                if !displaced.contains(&other) {
                    displaced.push(other);
                }
            }
        } else {
            for &other in &room_occupants {
                let other_exclusive = data
                    .constraints_for(other)
                    .iter()
                    .any(|c| matches!(c, HardConstraint::RoomExclusive { exam: e } if *e == other));
                if other_exclusive && !displaced.contains(&other) {
                    displaced.push(other);
                }
            }
        }

        // Room-Occupancy: greedily evict occupants of (room, period) until capacity admits exam,
        // preferring to evict exams already marked for eviction above first (no extra cost), then
        // by ascending index for determinism.
        let mut remaining: Vec<u32> = room_occupants
            .iter()
            .filter(|o| !displaced.contains(o))
            .copied()
            .collect();
        remaining.sort_unstable();
        let capacity = data.rooms[room as usize].capacity;
        let mut seats: u32 = remaining
            .iter()
            .map(|&o| data.exams[o as usize].num_students)
            .sum::<u32>();
        let mut idx = 0;
        while seats + data.exams[exam as usize].num_students > capacity && idx < remaining.len() {
            let o = remaining[idx];
            seats -= data.exams[o as usize].num_students;
            displaced.push(o);
            idx += 1;
        }
        if seats + data.exams[exam as usize].num_students > capacity {
            return None;
        }

        // Period-related hard constraints against already-scheduled partner exams.
        for c in data.constraints_for(exam) {
            match *c {
                HardConstraint::After { exam1, exam2 } => {
                    let (this, other) = if exam1 == exam {
                        (exam1, exam2)
                    } else {
                        (exam2, exam1)
                    };
                    if let Some(other_period) = tt.period_of(other) {
                        let ok = if this == exam1 {
                            period > other_period
                        } else {
                            other_period > period
                        };
                        if !ok && !displaced.contains(&other) {
                            displaced.push(other);
                        }
                    }
                }
                HardConstraint::Coincidence { exam1, exam2 } => {
                    let other = if exam1 == exam { exam2 } else { exam1 };
                    if data.conflict(exam, other) == 0 {
                        if let Some(other_period) = tt.period_of(other) {
                            if other_period != period && !displaced.contains(&other) {
                                displaced.push(other);
                            }
                        }
                    }
                }
                HardConstraint::Exclusion { exam1, exam2 } => {
                    let other = if exam1 == exam { exam2 } else { exam1 };
                    if let Some(other_period) = tt.period_of(other) {
                        if other_period == period && !displaced.contains(&other) {
                            displaced.push(other);
                        }
                    }
                }
                HardConstraint::RoomExclusive { .. } => {}
            }
        }

        Some(displaced)
    }

    fn propagate(
        &self,
        data: &ProblemData,
        tt: &Timetable,
        exam: u32,
        available: &mut [Vec<bool>],
        available_count: &mut [usize],
    ) {
        let period = match tt.period_of(exam) {
            Some(p) => p,
            None => return,
        };
        for &neighbour in data.neighbours(exam) {
            if tt.is_scheduled(neighbour) {
                continue;
            }
            let row = &mut available[neighbour as usize];
            if row[period as usize] {
                row[period as usize] = false;
                available_count[neighbour as usize] -= 1;
            }
        }
    }
}

impl Default for Constructor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::problem::{Exam, FrontLoad, HardConstraint, Period, ProblemData, Room, Weightings};
    use chrono::NaiveDate;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

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

    fn periods(n: usize) -> Vec<Period> {
        let dt = NaiveDate::from_ymd_opt(2020, 1, 1)
            .unwrap()
            .and_hms_opt(9, 0, 0)
            .unwrap();
        (0..n)
            .map(|i| Period {
                index: i as u32,
                date_time: dt + chrono::Duration::hours(i as i64),
                duration: 60,
                penalty: 0,
            })
            .collect()
    }

    #[test]
    fn minimal_instance_schedules_conflicting_exams_apart() {
        let exams = vec![
            Exam {
                index: 0,
                num_students: 1,
                duration: 60,
            },
            Exam {
                index: 1,
                num_students: 1,
                duration: 60,
            },
        ];
        let rooms = vec![Room {
            index: 0,
            capacity: 2,
            penalty: 0,
        }];
        let matrix = vec![0, 1, 1, 0];
        let data = Arc::new(ProblemData::new(
            exams,
            periods(2),
            rooms,
            weightings(),
            matrix,
            vec![],
        ));
        let mut rng = StdRng::seed_from_u64(42);
        let mut constructor = Constructor::new();
        let tt = constructor.construct(data, &mut rng).unwrap();
        assert!(tt.is_feasible());
        assert_ne!(tt.period_of(0), tt.period_of(1));
    }

    #[test]
    fn coincidence_is_ignored_when_exams_conflict() {
        let exams = vec![
            Exam {
                index: 0,
                num_students: 1,
                duration: 60,
            },
            Exam {
                index: 1,
                num_students: 1,
                duration: 60,
            },
        ];
        let rooms = vec![Room {
            index: 0,
            capacity: 2,
            penalty: 0,
        }];
        let matrix = vec![0, 1, 1, 0];
        let constraints = vec![HardConstraint::Coincidence { exam1: 0, exam2: 1 }];
        let data = Arc::new(ProblemData::new(
            exams,
            periods(2),
            rooms,
            weightings(),
            matrix,
            constraints,
        ));
        let mut rng = StdRng::seed_from_u64(1);
        let mut constructor = Constructor::new();
        let tt = constructor.construct(data, &mut rng).unwrap();
        // the two exams conflict (share a student), so Coincidence is exempted and they must
        // still land in different periods
        assert!(tt.is_feasible());
        assert_ne!(tt.period_of(0), tt.period_of(1));
    }

    #[test]
    fn room_exclusive_forces_split_into_separate_rooms() {
        let exams = vec![
            Exam {
                index: 0,
                num_students: 1,
                duration: 60,
            },
            Exam {
                index: 1,
                num_students: 1,
                duration: 60,
            },
        ];
        let rooms = vec![
            Room {
                index: 0,
                capacity: 100,
                penalty: 0,
            },
            Room {
                index: 1,
                capacity: 100,
                penalty: 0,
            },
        ];
        let matrix = vec![0u32; 4];
        let constraints = vec![HardConstraint::RoomExclusive { exam: 0 }];
        let data = Arc::new(ProblemData::new(
            exams,
            periods(1),
            rooms,
            weightings(),
            matrix,
            constraints,
        ));
        let mut rng = StdRng::seed_from_u64(3);
        let mut constructor = Constructor::new();
        let tt = constructor.construct(data, &mut rng).unwrap();
        assert!(tt.is_feasible());
        assert_ne!(tt.room_of(0), tt.room_of(1));
    }

    #[test]
    fn after_chain_orders_exams() {
        let exams = vec![
            Exam {
                index: 0,
                num_students: 1,
                duration: 60,
            },
            Exam {
                index: 1,
                num_students: 1,
                duration: 60,
            },
            Exam {
                index: 2,
                num_students: 1,
                duration: 60,
            },
        ];
        let rooms = vec![Room {
            index: 0,
            capacity: 100,
            penalty: 0,
        }];
        let matrix = vec![0u32; 9];
        let constraints = vec![
            HardConstraint::After { exam1: 2, exam2: 1 },
            HardConstraint::After { exam1: 1, exam2: 0 },
        ];
        let data = Arc::new(ProblemData::new(
            exams,
            periods(3),
            rooms,
            weightings(),
            matrix,
            constraints,
        ));
        let mut rng = StdRng::seed_from_u64(7);
        let mut constructor = Constructor::new();
        let tt = constructor.construct(data, &mut rng).unwrap();
        assert!(tt.is_feasible());
        assert!(tt.period_of(0) < tt.period_of(1));
        assert!(tt.period_of(1) < tt.period_of(2));
    }
}
