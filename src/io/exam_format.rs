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

//! Parser for the ITC-2007 `.exam` benchmark file format.

use crate::error::{ExamTtError, ParseError};
use crate::problem::{Exam, FrontLoad, HardConstraint, Period, ProblemData, Room, Weightings};
use chrono::NaiveDateTime;
use std::collections::HashMap;
use std::io::Read;

#[derive(Debug, PartialEq, Eq)]
enum Section {
    None,
    Exams,
    Periods,
    Rooms,
    PeriodHardConstraints,
    RoomHardConstraints,
    InstitutionalWeightings,
}

fn split_fields(line: &str) -> Vec<&str> {
    line.split(',').map(str::trim).collect()
}

fn parse_u32(line_no: usize, field: &str) -> Result<u32, ParseError> {
    field
        .trim()
        .parse::<u32>()
        .map_err(|source| ParseError::InvalidInteger {
            line: line_no,
            field: field.to_string(),
            source,
        })
}

fn parse_i32(line_no: usize, field: &str) -> Result<i32, ParseError> {
    field
        .trim()
        .parse::<i32>()
        .map_err(|source| ParseError::InvalidInteger {
            line: line_no,
            field: field.to_string(),
            source,
        })
}

fn parse_section_header(line: &str) -> Option<(&str, Option<usize>)> {
    let inner = line.strip_prefix('[')?.strip_suffix(']')?;
    match inner.split_once(':') {
        Some((name, count)) => Some((name, count.parse::<usize>().ok())),
        None => Some((inner, None)),
    }
}

/// Parse a complete `.exam` file into a `ProblemData`. Unknown lines outside of the recognised
/// sections are ignored, as specified.
pub fn read<R: Read>(mut reader: R) -> Result<ProblemData, ExamTtError> {
    let mut content = String::new();
    reader.read_to_string(&mut content)?;

    let mut section = Section::None;
    let mut exam_durations: Vec<u32> = Vec::new();
    let mut exam_students: Vec<Vec<u32>> = Vec::new();
    let mut periods: Vec<Period> = Vec::new();
    let mut rooms: Vec<Room> = Vec::new();
    let mut constraints: Vec<HardConstraint> = Vec::new();
    let mut weightings: HashMap<String, Vec<i32>> = HashMap::new();

    for (zero_based_line, raw_line) in content.lines().enumerate() {
        let line_no = zero_based_line + 1;
        let line = raw_line.trim();
        if line.is_empty() {
            continue;
        }
        if line.starts_with('[') {
            let (name, _count) =
                parse_section_header(line).ok_or_else(|| ParseError::ExpectedSection {
                    line: line_no,
                    found: line.to_string(),
                })?;
            section = match name {
                "Exams" => Section::Exams,
                "Periods" => Section::Periods,
                "Rooms" => Section::Rooms,
                "PeriodHardConstraints" => Section::PeriodHardConstraints,
                "RoomHardConstraints" => Section::RoomHardConstraints,
                "InstitutionalWeightings" => Section::InstitutionalWeightings,
                _ => Section::None,
            };
            continue;
        }

        match section {
            Section::None => continue,
            Section::Exams => {
                let fields = split_fields(line);
                if fields.len() < 2 {
                    return Err(ParseError::FieldCount {
                        line: line_no,
                        expected: 2,
                        found: fields.len(),
                    }
                    .into());
                }
                exam_durations.push(parse_u32(line_no, fields[0])?);
                let mut students = Vec::with_capacity(fields.len() - 1);
                for field in &fields[1..] {
                    students.push(parse_u32(line_no, field)?);
                }
                exam_students.push(students);
            }
            Section::Periods => {
                let fields = split_fields(line);
                if fields.len() != 4 {
                    return Err(ParseError::FieldCount {
                        line: line_no,
                        expected: 4,
                        found: fields.len(),
                    }
                    .into());
                }
                let date_time_str = format!("{} {}", fields[0], fields[1]);
                let date_time = NaiveDateTime::parse_from_str(&date_time_str, "%d:%m:%Y %H:%M:%S")
                    .map_err(|source| ParseError::InvalidDateTime {
                        line: line_no,
                        field: date_time_str,
                        source,
                    })?;
                periods.push(Period {
                    index: periods.len() as u32,
                    date_time,
                    duration: parse_u32(line_no, fields[2])?,
                    penalty: parse_i32(line_no, fields[3])?,
                });
            }
            Section::Rooms => {
                let fields = split_fields(line);
                if fields.len() != 2 {
                    return Err(ParseError::FieldCount {
                        line: line_no,
                        expected: 2,
                        found: fields.len(),
                    }
                    .into());
                }
                rooms.push(Room {
                    index: rooms.len() as u32,
                    capacity: parse_u32(line_no, fields[0])?,
                    penalty: parse_i32(line_no, fields[1])?,
                });
            }
            Section::PeriodHardConstraints => {
                let fields = split_fields(line);
                if fields.len() != 3 {
                    return Err(ParseError::FieldCount {
                        line: line_no,
                        expected: 3,
                        found: fields.len(),
                    }
                    .into());
                }
                let exam1 = parse_u32(line_no, fields[0])?;
                let exam2 = parse_u32(line_no, fields[2])?;
                let num_exams = exam_durations.len();
                if exam1 as usize >= num_exams {
                    return Err(ParseError::ExamIndexOutOfRange {
                        line: line_no,
                        index: exam1 as usize,
                        num_exams,
                    }
                    .into());
                }
                if exam2 as usize >= num_exams {
                    return Err(ParseError::ExamIndexOutOfRange {
                        line: line_no,
                        index: exam2 as usize,
                        num_exams,
                    }
                    .into());
                }
                let constraint = match fields[1] {
                    "AFTER" => HardConstraint::After { exam1, exam2 },
                    "EXAM_COINCIDENCE" => HardConstraint::Coincidence { exam1, exam2 },
                    "EXCLUSION" => HardConstraint::Exclusion { exam1, exam2 },
                    other => {
                        return Err(ParseError::UnknownConstraint {
                            line: line_no,
                            keyword: other.to_string(),
                        }
                        .into())
                    }
                };
                constraints.push(constraint);
            }
            Section::RoomHardConstraints => {
                let fields = split_fields(line);
                if fields.len() != 2 {
                    return Err(ParseError::FieldCount {
                        line: line_no,
                        expected: 2,
                        found: fields.len(),
                    }
                    .into());
                }
                let exam = parse_u32(line_no, fields[0])?;
                if fields[1] != "ROOM_EXCLUSIVE" {
                    return Err(ParseError::UnknownConstraint {
                        line: line_no,
                        keyword: fields[1].to_string(),
                    }
                    .into());
                }
                constraints.push(HardConstraint::RoomExclusive { exam });
            }
            Section::InstitutionalWeightings => {
                let fields = split_fields(line);
                if fields.len() < 2 {
                    return Err(ParseError::FieldCount {
                        line: line_no,
                        expected: 2,
                        found: fields.len(),
                    }
                    .into());
                }
                let mut values = Vec::with_capacity(fields.len() - 1);
                for field in &fields[1..] {
                    values.push(parse_i32(line_no, field)?);
                }
                weightings.insert(fields[0].to_string(), values);
            }
        }
    }

    if exam_durations.is_empty() {
        return Err(ParseError::MissingSection("Exams").into());
    }
    if periods.is_empty() {
        return Err(ParseError::MissingSection("Periods").into());
    }
    if rooms.is_empty() {
        return Err(ParseError::MissingSection("Rooms").into());
    }

    let num_exams = exam_durations.len();
    let mut conflict_matrix = vec![0u32; num_exams * num_exams];
    let mut students_of: HashMap<u32, Vec<u32>> = HashMap::new();
    for (exam_index, students) in exam_students.iter().enumerate() {
        for &student in students {
            students_of.entry(student).or_default().push(exam_index as u32);
        }
    }
    for exams_of_student in students_of.values() {
        for i in 0..exams_of_student.len() {
            for j in (i + 1)..exams_of_student.len() {
                let (e1, e2) = (exams_of_student[i], exams_of_student[j]);
                conflict_matrix[e1 as usize * num_exams + e2 as usize] += 1;
                conflict_matrix[e2 as usize * num_exams + e1 as usize] += 1;
            }
        }
    }

    let exams: Vec<Exam> = exam_durations
        .into_iter()
        .zip(exam_students.iter())
        .enumerate()
        .map(|(i, (duration, students))| Exam {
            index: i as u32,
            num_students: students.len() as u32,
            duration,
        })
        .collect();

    let get_weight = |key: &str, idx: usize| -> i32 {
        weightings.get(key).and_then(|v| v.get(idx)).copied().unwrap_or(0)
    };
    let front_load_values = weightings.get("FRONTLOAD");
    let weightings_struct = Weightings {
        two_in_a_row: get_weight("TWOINAROW", 0),
        two_in_a_day: get_weight("TWOINADAY", 0),
        period_spread: get_weight("PERIODSPREAD", 0),
        non_mixed_durations: get_weight("NONMIXEDDURATIONS", 0),
        front_load: FrontLoad {
            num_large_exams: front_load_values
                .and_then(|v| v.first())
                .copied()
                .unwrap_or(0)
                .max(0) as usize,
            num_last_periods: front_load_values
                .and_then(|v| v.get(1))
                .copied()
                .unwrap_or(0)
                .max(0) as usize,
            weight: front_load_values.and_then(|v| v.get(2)).copied().unwrap_or(0),
        },
    };

    Ok(ProblemData::new(
        exams,
        periods,
        rooms,
        weightings_struct,
        conflict_matrix,
        constraints,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_file() {
        let text = "\
[Exams:2]
60, 1, 2
60, 2, 3
[Periods:2]
01:01:2020, 09:00:00, 60, 0
01:01:2020, 11:00:00, 60, 0
[Rooms:1]
10, 0
[PeriodHardConstraints]
[RoomHardConstraints]
[InstitutionalWeightings]
TWOINAROW, 5
TWOINADAY, 3
PERIODSPREAD, 2
NONMIXEDDURATIONS, 1
FRONTLOAD, 1, 1, 2
";
        let data = read(text.as_bytes()).unwrap();
        assert_eq!(data.num_exams(), 2);
        assert_eq!(data.num_periods(), 2);
        assert_eq!(data.num_rooms(), 1);
        // exam 0 and 1 share student 2
        assert_eq!(data.conflict(0, 1), 1);
        assert_eq!(data.weightings.two_in_a_row, 5);
        assert_eq!(data.weightings.front_load.num_large_exams, 1);
    }

    #[test]
    fn rejects_unknown_constraint_keyword() {
        let text = "\
[Exams:1]
60, 1
[Periods:1]
01:01:2020, 09:00:00, 60, 0
[Rooms:1]
10, 0
[PeriodHardConstraints]
0, NONSENSE, 0
";
        let result = read(text.as_bytes());
        assert!(result.is_err());
    }
}
