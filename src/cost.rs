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

//! Full and incremental evaluation of the seven soft-cost terms.

use crate::error::InvariantViolation;
use crate::problem::ProblemData;
use crate::timetable::Timetable;
use std::collections::{HashMap, HashSet};

fn same_day(data: &ProblemData, p1: u32, p2: u32) -> bool {
    data.periods[p1 as usize].date_time.date() == data.periods[p2 as usize].date_time.date()
}

fn adjacent_periods(data: &ProblemData, p1: u32, p2: u32) -> bool {
    same_day(data, p1, p2) && (p1 as i64 - p2 as i64).abs() == 1
}

/// The two-in-a-row / two-in-a-day / period-spread contribution of one conflicting exam pair,
/// given the two periods they are (tentatively) scheduled in.
fn pairwise_term(data: &ProblemData, conflict: u32, p1: u32, p2: u32) -> f64 {
    if conflict == 0 || p1 == p2 {
        return 0.0;
    }
    let w = &data.weightings;
    let mut v = 0.0;
    if adjacent_periods(data, p1, p2) {
        v += conflict as f64 * w.two_in_a_row as f64;
    } else if same_day(data, p1, p2) {
        v += conflict as f64 * w.two_in_a_day as f64;
    }
    let radius = w.period_spread as i64;
    if (p1 as i64 - p2 as i64).abs() <= radius {
        v += conflict as f64;
    }
    v
}

/// The mixed-durations / front-load / soft-room-penalty / soft-period-penalty contribution of
/// one period's contents, in isolation (no dependency on any other period).
fn period_local_cost(data: &ProblemData, period: u32, contents: &[(u32, u32)]) -> f64 {
    let mut v = 0.0;
    let period_data = &data.periods[period as usize];
    let w = &data.weightings;

    let mut durations_by_room: HashMap<u32, HashSet<u32>> = HashMap::new();
    for &(exam, room) in contents {
        durations_by_room
            .entry(room)
            .or_default()
            .insert(data.exams[exam as usize].duration);
    }
    for durations in durations_by_room.values() {
        if durations.len() > 1 {
            v += (durations.len() - 1) as f64 * w.non_mixed_durations as f64;
        }
    }

    if data.is_last_period(period) {
        for &(exam, _) in contents {
            if data.large_exams().contains(&exam) {
                v += w.front_load.weight as f64;
            }
        }
    }

    v += contents.len() as f64 * period_data.penalty as f64;
    for &(_, room) in contents {
        v += data.rooms[room as usize].penalty as f64;
    }
    v
}

/// Full, from-scratch evaluation of the soft cost of a (complete) timetable.
pub fn full_cost(tt: &Timetable) -> f64 {
    let data: &ProblemData = tt.problem();
    let mut v = 0.0;
    for period in 0..data.num_periods() as u32 {
        v += period_local_cost(data, period, tt.period_exams(period));
    }
    for exam in 0..data.num_exams() as u32 {
        let Some(p1) = tt.period_of(exam) else {
            continue;
        };
        for &other in data.neighbours(exam) {
            if other <= exam {
                continue;
            }
            if let Some(p2) = tt.period_of(other) {
                v += pairwise_term(data, data.conflict(exam, other), p1, p2);
            }
        }
    }
    v
}

/// Incremental delta to the soft cost caused by a Kempe move that replaced the contents of
/// periods `t_i` and `t_j` (possibly `t_i == t_j` for a room-only move). `old_ti`/`old_tj` are
/// the periods' contents *before* the move; `tt` must already reflect the *after* state.
///
/// Returns `full_cost(after) - full_cost(before)`. Panics-free; callers should verify hard
/// feasibility separately before trusting the resulting cost.
pub fn incremental_delta(
    tt: &Timetable,
    t_i: u32,
    t_j: u32,
    old_ti: &[(u32, u32)],
    old_tj: &[(u32, u32)],
) -> f64 {
    let data: &ProblemData = tt.problem();
    let mut delta = 0.0;

    // --- period-local terms ---
    delta -= period_local_cost(data, t_i, old_ti);
    delta += period_local_cost(data, t_i, tt.period_exams(t_i));
    if t_j != t_i {
        delta -= period_local_cost(data, t_j, old_tj);
        delta += period_local_cost(data, t_j, tt.period_exams(t_j));
    }

    // --- pairwise terms, split into moved-vs-stationary and moved-vs-moved ---
    let mut old_period_of: HashMap<u32, u32> = HashMap::new();
    for &(e, _) in old_ti {
        old_period_of.insert(e, t_i);
    }
    if t_j != t_i {
        for &(e, _) in old_tj {
            old_period_of.insert(e, t_j);
        }
    }
    let moved: HashSet<u32> = old_period_of.keys().copied().collect();

    for &exam in &moved {
        let old_p = old_period_of[&exam];
        // an exam that didn't actually change period (e.g. a ShiftMove chain member that
        // bounced back into its original period) contributes nothing here
        let new_p = match tt.period_of(exam) {
            Some(p) => p,
            None => continue,
        };
        for &other in data.neighbours(exam) {
            if moved.contains(&other) {
                continue;
            }
            let conflict = data.conflict(exam, other);
            let other_p = match tt.period_of(other) {
                Some(p) => p,
                None => continue,
            };
            delta -= pairwise_term(data, conflict, old_p, other_p);
            delta += pairwise_term(data, conflict, new_p, other_p);
        }
    }

    let mut moved_vec: Vec<u32> = moved.into_iter().collect();
    moved_vec.sort_unstable();
    for i in 0..moved_vec.len() {
        for j in (i + 1)..moved_vec.len() {
            let (e1, e2) = (moved_vec[i], moved_vec[j]);
            let conflict = data.conflict(e1, e2);
            if conflict == 0 {
                continue;
            }
            let old_p1 = old_period_of[&e1];
            let old_p2 = old_period_of[&e2];
            if let (Some(new_p1), Some(new_p2)) = (tt.period_of(e1), tt.period_of(e2)) {
                delta -= pairwise_term(data, conflict, old_p1, old_p2);
                delta += pairwise_term(data, conflict, new_p1, new_p2);
            }
        }
    }

    delta
}

/// Recompute the full soft cost and compare it against `tt`'s cached value (§P6). Intended for
/// debug-build assertions in the hot loop after a Kempe move is applied, not the hot path itself.
pub(crate) fn check_cost_invariant(tt: &Timetable) -> Result<(), InvariantViolation> {
    let recomputed = full_cost(tt);
    let cached = tt.cost();
    if (cached - recomputed).abs() > 1e-6 {
        return Err(InvariantViolation::CostMismatch { cached, recomputed });
    }
    Ok(())
}
