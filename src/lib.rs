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

//! Solver for the ITC-2007 Examination Timetabling Problem: a saturation-degree construction
//! heuristic feeding a cellular evolutionary algorithm whose local search moves exams via
//! feasibility-preserving Kempe chains.

mod cellular;
mod construct;
mod cost;
mod error;
pub mod io;
mod kempe;
mod problem;
mod threshold;
mod timetable;

pub use cellular::{CellularEa, CellularEaConfig, GridShape};
pub use construct::Constructor;
pub use cost::full_cost;
pub use error::{ExamTtError, InfeasibleConstruction, InvariantViolation, ParseError};
pub use problem::{Exam, FrontLoad, HardConstraint, Period, ProblemData, Room, Weightings};
pub use threshold::{CancelFlag, CoolingSchedule, ThresholdAccepting};
pub use timetable::{Placement, Timetable};
