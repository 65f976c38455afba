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

//! Threshold Accepting local search: a deterministic relative of simulated annealing that
//! accepts any feasible neighbour within a shrinking threshold of the current cost.

use crate::cost;
use crate::kempe::KempeMove;
use crate::timetable::Timetable;
use rand::Rng;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared cooperative cancellation flag, set by a signal handler and polled at safe points.
pub type CancelFlag = Arc<AtomicBool>;

/// The cooling schedule parameters: start at `t_max`, shrink to `t_max * alpha` every `span`
/// iterations, stop once the threshold drops below `t_min`.
#[derive(Debug, Clone, Copy)]
pub struct CoolingSchedule {
    pub t_max: f64,
    pub alpha: f64,
    pub span: u32,
    pub t_min: f64,
}

impl CoolingSchedule {
    /// Total number of moves this schedule will attempt, `span * ceil(log(t_min/t_max)/log(alpha))`.
    pub fn total_iterations(&self) -> u64 {
        let ratio = (self.t_min / self.t_max).ln() / self.alpha.ln();
        self.span as u64 * ratio.ceil().max(0.0) as u64
    }
}

/// Runs one Threshold Accepting trajectory over a `Timetable`, tracking the best feasible
/// solution seen.
pub struct ThresholdAccepting {
    schedule: CoolingSchedule,
}

impl ThresholdAccepting {
    pub fn new(schedule: CoolingSchedule) -> Self {
        ThresholdAccepting { schedule }
    }

    /// Run the cooling schedule starting from `tt` (mutated in place to the final-iteration
    /// state) and return the best feasible solution found, honouring `cancel`.
    pub fn run<R: Rng + ?Sized>(
        &self,
        tt: &mut Timetable,
        rng: &mut R,
        cancel: &CancelFlag,
    ) -> Timetable {
        if tt.cost == 0.0 {
            tt.cost = cost::full_cost(tt);
        }
        let mut best = tt.clone();

        let mut threshold = self.schedule.t_max;
        while threshold >= self.schedule.t_min {
            if cancel.load(Ordering::Relaxed) {
                break;
            }
            for _ in 0..self.schedule.span {
                if cancel.load(Ordering::Relaxed) {
                    break;
                }
                let mut candidate = if rng.gen_bool(0.5) {
                    KempeMove::build_room_move(tt, rng)
                } else {
                    KempeMove::build_shift_move(tt, rng)
                };
                let Some(mv) = candidate.as_mut() else {
                    continue;
                };
                mv.evaluate(tt);
                if !mv.is_feasible_neighbour() {
                    continue;
                }
                let neighbour_cost = mv.neighbour_cost(tt.cost);
                if neighbour_cost <= tt.cost + threshold {
                    mv.apply(tt);
                    if cfg!(debug_assertions) {
                        if let Err(e) = tt.check_invariants() {
                            panic!("timetable invariant violated after a Kempe move: {}", e);
                        }
                        if let Err(e) = cost::check_cost_invariant(tt) {
                            panic!("cost invariant violated after a Kempe move: {}", e);
                        }
                    }
                    if tt.cost < best.cost {
                        best = tt.clone();
                    }
                }
            }
            threshold *= self.schedule.alpha;
        }

        best
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
    use std::sync::atomic::AtomicBool;
    use std::sync::Arc;

    fn sample() -> Arc<ProblemData> {
        let exams: Vec<Exam> = (0..6)
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
        let periods: Vec<Period> = (0..6)
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
                capacity: 2,
                penalty: 1,
            },
            Room {
                index: 1,
                capacity: 2,
                penalty: 2,
            },
        ];
        let mut matrix = vec![0u32; 36];
        matrix[0 * 6 + 1] = 1;
        matrix[1 * 6 + 0] = 1;
        matrix[2 * 6 + 3] = 1;
        matrix[3 * 6 + 2] = 1;
        let weightings = Weightings {
            two_in_a_row: 2,
            two_in_a_day: 1,
            period_spread: 1,
            non_mixed_durations: 1,
            front_load: FrontLoad {
                num_large_exams: 1,
                num_last_periods: 2,
                weight: 3,
            },
        };
        Arc::new(ProblemData::new(
            exams, periods, rooms, weightings, matrix, vec![],
        ))
    }

    #[test]
    fn cooling_schedule_matches_scenario_formula() {
        let schedule = CoolingSchedule {
            t_max: 10.0,
            alpha: 0.001,
            span: 5,
            t_min: 2e-4,
        };
        assert_eq!(schedule.total_iterations(), 10);
    }

    #[test]
    fn best_solution_never_regresses() {
        let data = sample();
        let mut rng = StdRng::seed_from_u64(99);
        let mut constructor = Constructor::new();
        let mut tt = constructor.construct(data, &mut rng).unwrap();
        let ta = ThresholdAccepting::new(CoolingSchedule {
            t_max: 5.0,
            alpha: 0.5,
            span: 10,
            t_min: 0.1,
        });
        let cancel = Arc::new(AtomicBool::new(false));
        let best = ta.run(&mut tt, &mut rng, &cancel);
        assert!(best.is_feasible());
        assert_float_eq::assert_float_absolute_eq!(best.cost, cost::full_cost(&best), 1e-9);
    }
}
