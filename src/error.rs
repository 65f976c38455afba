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

//! Error types for parsing, construction and internal invariant checking.

use thiserror::Error;

/// Top-level error type returned by the public API of this crate.
#[derive(Error, Debug)]
pub enum ExamTtError {
    #[error("could not parse input data: {0}")]
    Parse(#[from] ParseError),
    #[error("could not construct a feasible timetable: {0}")]
    Infeasible(#[from] InfeasibleConstruction),
    #[error("internal invariant violated: {0}")]
    Invariant(#[from] InvariantViolation),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A malformed `.exam` benchmark file.
#[derive(Error, Debug)]
pub enum ParseError {
    #[error("line {line}: expected section header, found {found:?}")]
    ExpectedSection { line: usize, found: String },
    #[error("line {line}: expected {expected} comma-separated fields, found {found}")]
    FieldCount {
        line: usize,
        expected: usize,
        found: usize,
    },
    #[error("line {line}: could not parse integer field {field:?}: {source}")]
    InvalidInteger {
        line: usize,
        field: String,
        #[source]
        source: std::num::ParseIntError,
    },
    #[error("line {line}: could not parse date/time {field:?}: {source}")]
    InvalidDateTime {
        line: usize,
        field: String,
        #[source]
        source: chrono::ParseError,
    },
    #[error("line {line}: unknown hard constraint keyword {keyword:?}")]
    UnknownConstraint { line: usize, keyword: String },
    #[error("line {line}: exam index {index} out of range (0..{num_exams})")]
    ExamIndexOutOfRange {
        line: usize,
        index: usize,
        num_exams: usize,
    },
    #[error("missing required section {0:?}")]
    MissingSection(&'static str),
}

/// Construction could not place every exam without violating a hard constraint.
#[derive(Error, Debug)]
pub enum InfeasibleConstruction {
    #[error("exam {exam} has no remaining feasible period after propagation")]
    NoFeasiblePeriod { exam: u32 },
    #[error("exam {exam} has no room satisfying capacity/exclusivity in any period")]
    NoFeasibleRoom { exam: u32 },
}

/// A violated internal consistency invariant; indicates a bug rather than a routine failure.
#[derive(Error, Debug)]
pub enum InvariantViolation {
    #[error("exam {exam} is scheduled twice")]
    DoubleScheduled { exam: u32 },
    #[error("exam {exam} expected to be scheduled, but is not")]
    NotScheduled { exam: u32 },
    #[error("room {room} occupancy at period {period} is {actual}, expected {expected}")]
    RoomOccupancyMismatch {
        room: u32,
        period: u32,
        actual: u32,
        expected: u32,
    },
    #[error("cached cost {cached} does not match recomputed cost {recomputed}")]
    CostMismatch { cached: f64, recomputed: f64 },
}
