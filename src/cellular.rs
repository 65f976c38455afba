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

//! The cellular evolutionary algorithm: a toroidal grid population, each cell updated from its
//! von Neumann neighbourhood via binary tournament selection, (disabled) crossover, mutation
//! and improvement by Threshold Accepting, and strict-improvement replacement.

use crate::construct::Constructor;
use crate::problem::ProblemData;
use crate::threshold::{CancelFlag, CoolingSchedule, ThresholdAccepting};
use crate::timetable::Timetable;
use log::{debug, info};
use rand::Rng;
use std::sync::atomic::Ordering;
use std::sync::Arc;

/// Dimensions of the toroidal population grid. The ITC-2007 reference configuration uses 4x4.
#[derive(Debug, Clone, Copy)]
pub struct GridShape {
    pub rows: usize,
    pub cols: usize,
}

impl GridShape {
    pub fn len(&self) -> usize {
        self.rows * self.cols
    }
}

/// Parameters of one cellular EA run.
#[derive(Debug, Clone, Copy)]
pub struct CellularEaConfig {
    pub grid: GridShape,
    pub schedule: CoolingSchedule,
    /// probability of running a full Threshold Accepting trajectory on the selected offspring
    pub p_mutation: f64,
    /// probability of running a full Threshold Accepting trajectory on the incumbent cell
    pub p_improvement: f64,
    pub generations: u64,
}

pub struct CellularEa {
    config: CellularEaConfig,
}

fn toroidal_neighbour_indices(row: usize, col: usize, grid: GridShape) -> [usize; 5] {
    let up = (row + grid.rows - 1) % grid.rows;
    let down = (row + 1) % grid.rows;
    let left = (col + grid.cols - 1) % grid.cols;
    let right = (col + 1) % grid.cols;
    [
        row * grid.cols + col,
        up * grid.cols + col,
        down * grid.cols + col,
        row * grid.cols + left,
        row * grid.cols + right,
    ]
}

/// Pick one of two uniformly random distinct members of `indices`, keeping the cheaper one.
fn binary_tournament<R: Rng + ?Sized>(
    population: &[Timetable],
    indices: &[usize; 5],
    rng: &mut R,
) -> usize {
    let a = indices[rng.gen_range(0..indices.len())];
    let b = indices[rng.gen_range(0..indices.len())];
    if population[a].cost <= population[b].cost {
        a
    } else {
        b
    }
}

impl CellularEa {
    pub fn new(config: CellularEaConfig) -> Self {
        CellularEa { config }
    }

    /// Seed the population with independent Constructor runs, then evolve it for
    /// `config.generations` generations (or until `cancel` is set), returning the best feasible
    /// timetable seen.
    ///
    /// Fails only if the construction heuristic cannot find a feasible seed timetable at all;
    /// that is a property of the instance, not of any particular run.
    pub fn run<R: Rng + ?Sized>(
        &self,
        data: Arc<ProblemData>,
        rng: &mut R,
        cancel: &CancelFlag,
    ) -> Result<Timetable, crate::error::InfeasibleConstruction> {
        let grid = self.config.grid;
        let mut constructor = Constructor::new();
        let mut population: Vec<Timetable> = Vec::with_capacity(grid.len());
        for _ in 0..grid.len() {
            let mut tt = constructor.construct(Arc::clone(&data), rng)?;
            tt.cost = crate::cost::full_cost(&tt);
            population.push(tt);
        }

        let ta = ThresholdAccepting::new(self.config.schedule);
        let mut best = population
            .iter()
            .min_by(|a, b| a.cost.partial_cmp(&b.cost).unwrap())
            .cloned()
            .expect("grid must have at least one cell");

        info!(
            "Seeded {}x{} cellular EA population; initial best cost {}",
            grid.rows, grid.cols, best.cost
        );

        for generation in 0..self.config.generations {
            if cancel.load(Ordering::Relaxed) {
                info!("Cancellation requested; stopping at generation {}", generation);
                break;
            }

            let mut next_population = population.clone();
            for row in 0..grid.rows {
                for col in 0..grid.cols {
                    if cancel.load(Ordering::Relaxed) {
                        break;
                    }
                    let idx = row * grid.cols + col;
                    let neighbours = toroidal_neighbour_indices(row, col, grid);

                    let mut incumbent = population[idx].clone();
                    if rng.gen_bool(self.config.p_improvement) {
                        incumbent = ta.run(&mut incumbent, rng, cancel);
                    }

                    let p1 = binary_tournament(&population, &neighbours, rng);
                    let p2 = binary_tournament(&population, &neighbours, rng);
                    let winner = if population[p1].cost <= population[p2].cost {
                        p1
                    } else {
                        p2
                    };
                    // Crossover is disabled (p_c = 0): the offspring is a direct clone of the
                    // tournament winner, optionally mutated below.
                    let mut offspring = population[winner].clone();
                    if rng.gen_bool(self.config.p_mutation) {
                        offspring = ta.run(&mut offspring, rng, cancel);
                    }

                    next_population[idx] = if offspring.cost < incumbent.cost {
                        offspring
                    } else {
                        incumbent
                    };
                }
            }
            population = next_population;

            if let Some(generation_best) = population
                .iter()
                .min_by(|a, b| a.cost.partial_cmp(&b.cost).unwrap())
            {
                if generation_best.cost < best.cost {
                    best = generation_best.clone();
                }
            }
            debug!("Generation {} best cost so far: {}", generation, best.cost);
        }

        Ok(best)
    }
}
