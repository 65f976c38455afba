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

//! Immutable problem description: exams, periods, rooms, conflicts and hard/soft constraints.

use chrono::NaiveDateTime;

/// A single exam to be scheduled.
#[derive(Debug, Clone)]
pub struct Exam {
    /// id/index of the exam in the problem's exam list
    pub index: u32,
    /// number of students enrolled in the exam
    pub num_students: u32,
    /// duration of the exam, in minutes
    pub duration: u32,
}

/// A period (timeslot) the exams may be scheduled into.
#[derive(Debug, Clone)]
pub struct Period {
    pub index: u32,
    pub date_time: NaiveDateTime,
    /// duration of the period, in minutes
    pub duration: u32,
    /// soft penalty added to the cost for every exam scheduled in this period
    pub penalty: i32,
}

/// A room exams may be scheduled into.
#[derive(Debug, Clone)]
pub struct Room {
    pub index: u32,
    pub capacity: u32,
    /// soft penalty added to the cost for every exam scheduled in this room
    pub penalty: i32,
}

/// A hard constraint tying two exams (or a single exam to its room) together.
///
/// Modeled as a tagged enum rather than via dynamic dispatch: the set of hard constraint
/// kinds is closed and evaluation is a simple match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HardConstraint {
    /// `exam1` must be scheduled strictly after `exam2` (by period index)
    After { exam1: u32, exam2: u32 },
    /// `exam1` and `exam2` must share the same period, unless they already conflict
    /// (share students), in which case this constraint is ignored
    Coincidence { exam1: u32, exam2: u32 },
    /// `exam1` and `exam2` must not share a period
    Exclusion { exam1: u32, exam2: u32 },
    /// no other exam may be scheduled in the same room during `exam`'s period
    RoomExclusive { exam: u32 },
}

/// Front-load soft constraint parameters: the `num_large_exams` largest exams (by enrolment)
/// should not be scheduled within the last `num_last_periods` periods.
#[derive(Debug, Clone, Copy)]
pub struct FrontLoad {
    pub num_large_exams: usize,
    pub num_last_periods: usize,
    pub weight: i32,
}

/// The institutional weightings for the seven soft-constraint terms.
#[derive(Debug, Clone, Copy)]
pub struct Weightings {
    pub two_in_a_row: i32,
    pub two_in_a_day: i32,
    pub period_spread: i32,
    pub non_mixed_durations: i32,
    pub front_load: FrontLoad,
}

/// The complete, immutable description of one ITC-2007 exam timetabling instance.
///
/// Built once by the `.exam` format parser and shared read-only (via `Arc`) by every
/// solution in the population.
#[derive(Debug)]
pub struct ProblemData {
    pub exams: Vec<Exam>,
    pub periods: Vec<Period>,
    pub rooms: Vec<Room>,
    pub weightings: Weightings,

    /// flattened symmetric conflict matrix: `conflict_matrix[e1 * num_exams + e2]` is the number
    /// of students enrolled in both `e1` and `e2`
    conflict_matrix: Vec<u32>,
    /// adjacency list of the exam conflict graph, derived from `conflict_matrix`
    exam_graph: Vec<Vec<u32>>,
    /// hard constraints involving each exam, indexed by exam
    exam_constraints: Vec<Vec<HardConstraint>>,
    all_constraints: Vec<HardConstraint>,

    /// the `front_load.num_large_exams` largest exams by enrolment, descending, ties by index
    large_exams: Vec<u32>,
}

impl ProblemData {
    /// Build a `ProblemData` from its components, deriving the conflict graph, per-exam
    /// constraint indices and the front-load large-exam set.
    ///
    /// `conflict_matrix` must be a flattened `num_exams * num_exams` symmetric matrix.
    pub fn new(
        exams: Vec<Exam>,
        periods: Vec<Period>,
        rooms: Vec<Room>,
        weightings: Weightings,
        conflict_matrix: Vec<u32>,
        constraints: Vec<HardConstraint>,
    ) -> Self {
        let num_exams = exams.len();
        assert_eq!(conflict_matrix.len(), num_exams * num_exams);

        let mut exam_graph = vec![Vec::new(); num_exams];
        for e1 in 0..num_exams {
            for e2 in (e1 + 1)..num_exams {
                if conflict_matrix[e1 * num_exams + e2] > 0 {
                    exam_graph[e1].push(e2 as u32);
                    exam_graph[e2].push(e1 as u32);
                }
            }
        }

        let mut exam_constraints = vec![Vec::new(); num_exams];
        for c in constraints.iter() {
            match *c {
                HardConstraint::After { exam1, exam2 } => {
                    exam_constraints[exam1 as usize].push(*c);
                    exam_constraints[exam2 as usize].push(*c);
                }
                HardConstraint::Coincidence { exam1, exam2 }
                | HardConstraint::Exclusion { exam1, exam2 } => {
                    exam_constraints[exam1 as usize].push(*c);
                    exam_constraints[exam2 as usize].push(*c);
                }
                HardConstraint::RoomExclusive { exam } => {
                    exam_constraints[exam as usize].push(*c);
                }
            }
        }

        let mut by_size: Vec<u32> = (0..num_exams as u32).collect();
        by_size.sort_by(|&a, &b| {
            exams[b as usize]
                .num_students
                .cmp(&exams[a as usize].num_students)
                .then(a.cmp(&b))
        });
        let large_exams = by_size
            .into_iter()
            .take(weightings.front_load.num_large_exams)
            .collect();

        ProblemData {
            exams,
            periods,
            rooms,
            weightings,
            conflict_matrix,
            exam_graph,
            exam_constraints,
            all_constraints: constraints,
            large_exams,
        }
    }

    pub fn num_exams(&self) -> usize {
        self.exams.len()
    }

    pub fn num_periods(&self) -> usize {
        self.periods.len()
    }

    pub fn num_rooms(&self) -> usize {
        self.rooms.len()
    }

    /// Number of students enrolled in both `e1` and `e2`; `0` iff they do not conflict.
    #[inline]
    pub fn conflict(&self, e1: u32, e2: u32) -> u32 {
        self.conflict_matrix[e1 as usize * self.num_exams() + e2 as usize]
    }

    /// The exam conflict graph's neighbours of `exam`.
    pub fn neighbours(&self, exam: u32) -> &[u32] {
        &self.exam_graph[exam as usize]
    }

    /// Hard constraints involving `exam` (as either side).
    pub fn constraints_for(&self, exam: u32) -> &[HardConstraint] {
        &self.exam_constraints[exam as usize]
    }

    pub fn all_constraints(&self) -> &[HardConstraint] {
        &self.all_constraints
    }

    /// The `front_load.num_large_exams` exams with the greatest enrolment (ties by lowest index).
    pub fn large_exams(&self) -> &[u32] {
        &self.large_exams
    }

    /// Whether `period` is one of the last `num_last_periods` periods of the session.
    pub fn is_last_period(&self, period: u32) -> bool {
        let threshold = self
            .num_periods()
            .saturating_sub(self.weightings.front_load.num_last_periods);
        period as usize >= threshold
    }
}

#[cfg(test)]
mod tests {
    use super::*;

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

    #[test]
    fn derives_conflict_graph_from_matrix() {
        let exams = vec![
            Exam {
                index: 0,
                num_students: 3,
                duration: 60,
            },
            Exam {
                index: 1,
                num_students: 2,
                duration: 60,
            },
            Exam {
                index: 2,
                num_students: 1,
                duration: 60,
            },
        ];
        // e0 and e1 conflict, e2 conflicts with no one
        let matrix = vec![0, 2, 0, 2, 0, 0, 0, 0, 0];
        let data = ProblemData::new(exams, Vec::new(), Vec::new(), weightings(), matrix, vec![]);
        assert_eq!(data.neighbours(0), &[1]);
        assert_eq!(data.neighbours(1), &[0]);
        assert_eq!(data.neighbours(2), &[] as &[u32]);
        assert_eq!(data.conflict(0, 1), 2);
        assert_eq!(data.large_exams(), &[0]);
    }
}
