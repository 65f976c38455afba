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

//! The Kempe-chain neighbourhood operator: `RoomMove` and `ShiftMove`, with a
//! build/evaluate/rollback/apply pipeline so a candidate can be scored before it is committed.

use crate::cost;
use crate::problem::{HardConstraint, ProblemData};
use crate::timetable::Timetable;
use rand::Rng;
use std::collections::{HashMap, VecDeque};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MoveKind {
    RoomMove,
    ShiftMove,
}

/// A tentatively-built move over a pair of periods (the same period twice, for `RoomMove`).
/// Holds enough state to evaluate its effect and, independently, to roll it back or commit it.
#[derive(Debug)]
pub struct KempeMove {
    kind: MoveKind,
    t_i: u32,
    t_j: u32,
    old_ti: Vec<(u32, u32)>,
    old_tj: Vec<(u32, u32)>,
    new_ti: Vec<(u32, u32)>,
    new_tj: Vec<(u32, u32)>,
    feasible: Option<bool>,
    cost_delta: f64,
}

fn remove_exam(list: &mut Vec<(u32, u32)>, exam: u32) -> Option<(u32, u32)> {
    let pos = list.iter().position(|&(e, _)| e == exam)?;
    Some(list.swap_remove(pos))
}

fn room_admits_sim(data: &ProblemData, exam: u32, period: u32, contents: &[(u32, u32)], room: u32) -> bool {
    let exam_data = &data.exams[exam as usize];
    if exam_data.duration > data.periods[period as usize].duration {
        return false;
    }
    let current_in_room: Vec<u32> = contents
        .iter()
        .filter(|&&(_, r)| r == room)
        .map(|&(e, _)| e)
        .collect();
    if !current_in_room.is_empty() {
        let exam_exclusive = data
            .constraints_for(exam)
            .iter()
            .any(|c| matches!(c, HardConstraint::RoomExclusive { exam: e } if *e == exam));
        if exam_exclusive {
            return false;
        }
        for &other in &current_in_room {
            let other_exclusive = data
                .constraints_for(other)
                .iter()
                .any(|c| matches!(c, HardConstraint::RoomExclusive { exam: e } if *e == other));
            if other_exclusive {
                return false;
            }
        }
    }
    let seats: u32 = current_in_room
        .iter()
        .map(|&o| data.exams[o as usize].num_students)
        .sum::<u32>()
        + exam_data.num_students;
    seats <= data.rooms[room as usize].capacity
}

fn random_admitting_room<R: Rng + ?Sized>(
    data: &ProblemData,
    exam: u32,
    period: u32,
    contents: &[(u32, u32)],
    exclude: Option<u32>,
    rng: &mut R,
) -> Option<u32> {
    let mut candidates: Vec<u32> = (0..data.num_rooms() as u32)
        .filter(|&r| Some(r) != exclude && room_admits_sim(data, exam, period, contents, r))
        .collect();
    if candidates.is_empty() {
        return None;
    }
    let idx = rng.gen_range(0..candidates.len());
    Some(candidates.swap_remove(idx))
}

/// Whether `room`'s occupants in `contents` (a tentative period layout) satisfy capacity and
/// RoomExclusive among themselves, in isolation from every other room.
fn room_contents_ok(data: &ProblemData, _period: u32, room: u32, contents: &[(u32, u32)]) -> bool {
    let occupants: Vec<u32> = contents
        .iter()
        .filter(|&&(_, r)| r == room)
        .map(|&(e, _)| e)
        .collect();
    if occupants.is_empty() {
        return true;
    }
    let seats: u32 = occupants
        .iter()
        .map(|&e| data.exams[e as usize].num_students)
        .sum();
    if seats > data.rooms[room as usize].capacity {
        return false;
    }
    let exclusive = occupants.iter().any(|&e| {
        data.constraints_for(e)
            .iter()
            .any(|c| matches!(c, HardConstraint::RoomExclusive { exam } if *exam == e))
    });
    if exclusive && occupants.len() > 1 {
        return false;
    }
    true
}

impl KempeMove {
    /// Build a `RoomMove`: swap an exam with a different room's occupants — the exam moves into
    /// the other room, and that room's current occupants move into the exam's old room. Both
    /// sides are checked for capacity and RoomExclusive compatibility before the move is
    /// accepted as a candidate.
    pub fn build_room_move<R: Rng + ?Sized>(tt: &Timetable, rng: &mut R) -> Option<KempeMove> {
        let data = tt.problem();
        let non_empty: Vec<u32> = (0..data.num_periods() as u32)
            .filter(|&t| !tt.period_exams(t).is_empty())
            .collect();
        if non_empty.is_empty() || data.num_rooms() < 2 {
            return None;
        }
        let t_i = non_empty[rng.gen_range(0..non_empty.len())];
        let old_ti = tt.period_exams(t_i).to_vec();
        let (exam, old_room) = old_ti[rng.gen_range(0..old_ti.len())];

        let mut candidate_rooms: Vec<u32> = (0..data.num_rooms() as u32)
            .filter(|&r| r != old_room)
            .collect();
        while !candidate_rooms.is_empty() {
            let idx = rng.gen_range(0..candidate_rooms.len());
            let new_room = candidate_rooms.swap_remove(idx);

            // exam moves into new_room; new_room's former occupants move into old_room.
            let new_ti: Vec<(u32, u32)> = old_ti
                .iter()
                .map(|&(e, r)| {
                    if e == exam {
                        (e, new_room)
                    } else if r == new_room {
                        (e, old_room)
                    } else {
                        (e, r)
                    }
                })
                .collect();

            if room_contents_ok(data, t_i, old_room, &new_ti)
                && room_contents_ok(data, t_i, new_room, &new_ti)
            {
                return Some(KempeMove {
                    kind: MoveKind::RoomMove,
                    t_i,
                    t_j: t_i,
                    old_ti,
                    old_tj: Vec::new(),
                    new_ti,
                    new_tj: Vec::new(),
                    feasible: None,
                    cost_delta: 0.0,
                });
            }
        }
        None
    }

    /// Build a `ShiftMove`: move an exam to a different period, propagating conflicts between
    /// the two periods along the conflict graph until the chain settles.
    pub fn build_shift_move<R: Rng + ?Sized>(tt: &Timetable, rng: &mut R) -> Option<KempeMove> {
        let data = tt.problem();
        let non_empty: Vec<u32> = (0..data.num_periods() as u32)
            .filter(|&t| !tt.period_exams(t).is_empty())
            .collect();
        if non_empty.is_empty() || data.num_periods() < 2 {
            return None;
        }
        let t_i = non_empty[rng.gen_range(0..non_empty.len())];
        let mut t_j = rng.gen_range(0..data.num_periods() as u32);
        while t_j == t_i {
            t_j = rng.gen_range(0..data.num_periods() as u32);
        }

        let occupants = tt.period_exams(t_i);
        let (exam, _) = occupants[rng.gen_range(0..occupants.len())];

        let old_ti = tt.period_exams(t_i).to_vec();
        let old_tj = tt.period_exams(t_j).to_vec();
        let mut cur_ti = old_ti.clone();
        let mut cur_tj = old_tj.clone();

        let mut moved: HashMap<u32, u32> = HashMap::new();
        let mut queue: VecDeque<u32> = VecDeque::new();
        moved.insert(exam, t_j);
        queue.push_back(exam);

        while let Some(x) = queue.pop_front() {
            let dest = moved[&x];
            let src = if dest == t_j { t_i } else { t_j };

            remove_exam(&mut cur_ti, x);
            remove_exam(&mut cur_tj, x);

            let dest_list = if dest == t_j { &mut cur_tj } else { &mut cur_ti };

            let room = if x == exam {
                random_admitting_room(data, x, dest, dest_list.as_slice(), None, rng)?
            } else {
                tt.room_of(x).expect("moved exam must be scheduled")
            };
            dest_list.push((x, room));

            let conflicting: Vec<u32> = dest_list
                .iter()
                .filter(|&&(o, _)| o != x && data.conflict(x, o) > 0 && !moved.contains_key(&o))
                .map(|&(o, _)| o)
                .collect();
            for o in conflicting {
                moved.insert(o, src);
                queue.push_back(o);
            }
        }

        Some(KempeMove {
            kind: MoveKind::ShiftMove,
            t_i,
            t_j,
            old_ti,
            old_tj,
            new_ti: cur_ti,
            new_tj: cur_tj,
            feasible: None,
            cost_delta: 0.0,
        })
    }

    /// Tentatively apply the move to `tt`, check hard feasibility and compute the soft-cost
    /// delta, then roll back so `tt` is left exactly as it was found.
    pub fn evaluate(&mut self, tt: &mut Timetable) {
        tt.replace_period(self.t_i, &self.new_ti);
        if self.t_j != self.t_i {
            tt.replace_period(self.t_j, &self.new_tj);
        }

        let feasible = if self.t_j == self.t_i {
            tt.periods_are_feasible(&[self.t_i])
        } else {
            tt.periods_are_feasible(&[self.t_i, self.t_j])
        };
        self.cost_delta = if self.t_j == self.t_i {
            cost::incremental_delta(tt, self.t_i, self.t_i, &self.old_ti, &[])
        } else {
            cost::incremental_delta(tt, self.t_i, self.t_j, &self.old_ti, &self.old_tj)
        };
        self.feasible = Some(feasible);

        tt.replace_period(self.t_i, &self.old_ti);
        if self.t_j != self.t_i {
            tt.replace_period(self.t_j, &self.old_tj);
        }
    }

    pub fn is_feasible_neighbour(&self) -> bool {
        self.feasible.unwrap_or(false)
    }

    /// The candidate's absolute cost, given the current incumbent's cost. Only meaningful once
    /// `evaluate` has run and `is_feasible_neighbour()` is true.
    pub fn neighbour_cost(&self, current_cost: f64) -> f64 {
        current_cost + self.cost_delta
    }

    pub fn cost_delta(&self) -> f64 {
        self.cost_delta
    }

    pub fn kind_name(&self) -> &'static str {
        match self.kind {
            MoveKind::RoomMove => "room-move",
            MoveKind::ShiftMove => "shift-move",
        }
    }

    /// Commit the move: `tt` must be in the same state it was in when the move was built.
    pub fn apply(&self, tt: &mut Timetable) {
        tt.replace_period(self.t_i, &self.new_ti);
        if self.t_j != self.t_i {
            tt.replace_period(self.t_j, &self.new_tj);
        }
        tt.cost += self.cost_delta;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::construct::Constructor;
    use crate::problem::{Exam, FrontLoad, Period, ProblemData, Room, Weightings};
    use chrono::NaiveDate;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::sync::Arc;

    fn sample() -> Arc<ProblemData> {
        let exams: Vec<Exam> = (0..4)
            .map(|i| Exam {
                index: i,
                num_students: 1,
                duration: 60,
            })
            .collect();
        let dt = NaiveDate::from_ymd_opt(2020, 1, 1)
            .unwrap()
            .and_hms_opt(9, 0, 0)
            .unwrap();
        let periods: Vec<Period> = (0..4)
            .map(|i| Period {
                index: i,
                date_time: dt + chrono::Duration::hours(i as i64),
                duration: 60,
                penalty: 0,
            })
            .collect();
        let rooms = vec![
            Room {
                index: 0,
                capacity: 1,
                penalty: 0,
            },
            Room {
                index: 1,
                capacity: 1,
                penalty: 0,
            },
        ];
        let mut matrix = vec![0u32; 16];
        matrix[0 * 4 + 1] = 1;
        matrix[1 * 4 + 0] = 1;
        let weightings = Weightings {
            two_in_a_row: 1,
            two_in_a_day: 1,
            period_spread: 1,
            non_mixed_durations: 1,
            front_load: FrontLoad {
                num_large_exams: 0,
                num_last_periods: 1,
                weight: 1,
            },
        };
        Arc::new(ProblemData::new(
            exams, periods, rooms, weightings, matrix, vec![],
        ))
    }

    #[test]
    fn room_move_swaps_occupants_between_rooms() {
        let exams: Vec<Exam> = (0..2)
            .map(|i| Exam {
                index: i,
                num_students: 1,
                duration: 60,
            })
            .collect();
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
        let rooms = vec![
            Room {
                index: 0,
                capacity: 1,
                penalty: 0,
            },
            Room {
                index: 1,
                capacity: 1,
                penalty: 0,
            },
        ];
        let weightings = Weightings {
            two_in_a_row: 1,
            two_in_a_day: 1,
            period_spread: 1,
            non_mixed_durations: 1,
            front_load: FrontLoad {
                num_large_exams: 0,
                num_last_periods: 1,
                weight: 1,
            },
        };
        let data = Arc::new(ProblemData::new(
            exams,
            periods,
            rooms,
            weightings,
            vec![0, 0, 0, 0],
            vec![],
        ));
        let mut tt = Timetable::new(data);
        tt.schedule(0, 0, 0);
        tt.schedule(1, 0, 1);

        let mut rng = StdRng::seed_from_u64(5);
        let mut mv = KempeMove::build_room_move(&tt, &mut rng).expect("a swap must be buildable");
        mv.evaluate(&mut tt);
        assert!(mv.is_feasible_neighbour());

        // each room's capacity is 1, so the only feasible RoomMove is the full swap
        mv.apply(&mut tt);
        assert_eq!(tt.room_of(0), Some(1));
        assert_eq!(tt.room_of(1), Some(0));
    }

    #[test]
    fn evaluate_then_rollback_is_idempotent() {
        let data = sample();
        let mut rng = StdRng::seed_from_u64(1);
        let mut constructor = Constructor::new();
        let mut tt = constructor.construct(data, &mut rng).unwrap();
        let before = tt.clone();

        let mut mv = KempeMove::build_shift_move(&tt, &mut rng)
            .or_else(|| KempeMove::build_room_move(&tt, &mut rng))
            .expect("some move should be buildable");
        mv.evaluate(&mut tt);

        assert_eq!(format!("{:?}", before.problem().exams.len()), format!("{:?}", tt.problem().exams.len()));
        for e in 0..tt.problem().num_exams() as u32 {
            assert_eq!(before.placement_of(e), tt.placement_of(e));
        }
    }

    #[test]
    fn incremental_cost_matches_full_cost_over_many_random_moves() {
        let data = sample();
        let mut rng = StdRng::seed_from_u64(1234);
        let mut constructor = Constructor::new();
        let mut tt = constructor.construct(data, &mut rng).unwrap();
        tt.cost = cost::full_cost(&tt);

        for _ in 0..1000 {
            let mut candidate = if rng.gen_bool(0.5) {
                KempeMove::build_room_move(&tt, &mut rng)
            } else {
                KempeMove::build_shift_move(&tt, &mut rng)
            };
            let Some(mv) = candidate.as_mut() else {
                continue;
            };
            mv.evaluate(&mut tt);
            if !mv.is_feasible_neighbour() {
                continue;
            }
            mv.apply(&mut tt);
            assert_float_eq::assert_float_absolute_eq!(tt.cost, cost::full_cost(&tt), 1e-6);
        }
    }

    #[test]
    fn apply_updates_cached_cost_by_delta() {
        let data = sample();
        let mut rng = StdRng::seed_from_u64(2);
        let mut constructor = Constructor::new();
        let mut tt = constructor.construct(data, &mut rng).unwrap();
        tt.cost = cost::full_cost(&tt);

        if let Some(mut mv) = KempeMove::build_shift_move(&tt, &mut rng) {
            mv.evaluate(&mut tt);
            if mv.is_feasible_neighbour() {
                let expected = tt.cost + mv.cost_delta();
                mv.apply(&mut tt);
                assert_eq!(tt.cost, expected);
                assert_eq!(cost::full_cost(&tt), tt.cost);
            }
        }
    }
}
