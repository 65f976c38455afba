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

pub mod exam_format;
pub mod solution_format;

use crate::problem::ProblemData;

/// Human-readable one-line-per-exam debug dump, analogous to a course listing.
pub fn debug_list_of_exams(data: &ProblemData) -> String {
    data.exams
        .iter()
        .map(|e| {
            format!(
                "{:04} duration={}min students={}",
                e.index, e.duration, e.num_students
            )
        })
        .collect::<Vec<String>>()
        .join("\n")
}

/// Assert that a freshly parsed `ProblemData` is internally consistent (index bookkeeping,
/// conflict matrix symmetry). Intended for debug builds, not the hot path.
pub fn assert_data_consistency(data: &ProblemData) {
    for (i, e) in data.exams.iter().enumerate() {
        assert_eq!(i, e.index as usize, "Index of {}. exam is {}", i, e.index);
    }
    for (i, p) in data.periods.iter().enumerate() {
        assert_eq!(i, p.index as usize, "Index of {}. period is {}", i, p.index);
    }
    for (i, r) in data.rooms.iter().enumerate() {
        assert_eq!(i, r.index as usize, "Index of {}. room is {}", i, r.index);
    }
    for e1 in 0..data.num_exams() as u32 {
        for e2 in 0..data.num_exams() as u32 {
            assert_eq!(
                data.conflict(e1, e2),
                data.conflict(e2, e1),
                "Conflict matrix is not symmetric for ({}, {})",
                e1,
                e2
            );
        }
        assert_eq!(data.conflict(e1, e1), 0, "Exam {} conflicts with itself", e1);
    }
}
