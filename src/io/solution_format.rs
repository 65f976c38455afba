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

//! Writer for the `.sol` solution file format: one `<period>, <room>` line per exam, in input
//! order, CRLF-separated with no trailing newline.

use crate::error::{ExamTtError, InvariantViolation};
use crate::timetable::Timetable;
use std::io::Write;

pub fn write<W: Write>(mut writer: W, tt: &Timetable) -> Result<(), ExamTtError> {
    let num_exams = tt.problem().num_exams();
    let mut lines = Vec::with_capacity(num_exams);
    for exam in 0..num_exams as u32 {
        let placement = tt
            .placement_of(exam)
            .ok_or(InvariantViolation::NotScheduled { exam })?;
        lines.push(format!("{}, {}", placement.period, placement.room));
    }
    writer.write_all(lines.join("\r\n").as_bytes())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::problem::{Exam, FrontLoad, Period, ProblemData, Room, Weightings};
    use chrono::NaiveDate;
    use std::sync::Arc;

    #[test]
    fn writes_one_line_per_exam_no_trailing_newline() {
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
            capacity: 2,
            penalty: 0,
        }];
        let weightings = Weightings {
            two_in_a_row: 1,
            two_in_a_day: 1,
            period_spread: 1,
            non_mixed_durations: 1,
            front_load: FrontLoad {
                num_large_exams: 0,
                num_last_periods: 1,
                weight: 0,
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
        tt.schedule(1, 0, 0);

        let mut buf = Vec::new();
        write(&mut buf, &tt).unwrap();
        assert_eq!(String::from_utf8(buf).unwrap(), "0, 0\r\n0, 0");
    }
}
