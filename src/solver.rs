use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, info_span, warn};

use crate::checkpoint::{Checkpoint, CheckpointDispatcher, CheckpointSink, DispatchStats};
use crate::config::{PoissonParameters, SaveParameters, ScenarioParameters, SimulationConfig};
use crate::domain::grid2d::{GridDimensions2D, GridState};
use crate::error::{CheckpointError, SolverError};
use crate::numerical::total_abs_divergence;
use crate::poisson::{solve_pressure, PoissonReport};

pub mod corrector;
pub mod predictor;

/// Cooperative early-stop flag, checked before every time step.
#[derive(Debug, Clone, Default)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    pub fn stop(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepReport {
    pub step: usize,
    pub time: f64,
    pub poisson: PoissonReport,
    /// Summed |divergence| over fluid cells after the correction.
    pub divergence: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub steps_completed: usize,
    pub time: f64,
    pub checkpoints_dispatched: usize,
    /// Checkpoints the dispatcher refused (full queue or dead worker).
    pub checkpoints_dropped: usize,
    pub stopped_early: bool,
    pub unconverged_steps: usize,
    pub last_step: Option<StepReport>,
    pub dispatch: Option<DispatchStats>,
}

/// Fractional-step time integration of one scenario.
#[derive(Debug)]
pub struct Simulation {
    pub state: GridState,
    scenario: ScenarioParameters,
    poisson: PoissonParameters,
    checkpoint_interval: usize,
    step: usize,
    time: f64,
    chunk_index: usize,
    dispatcher: Option<CheckpointDispatcher>,
    stop: StopHandle,
}

impl Simulation {
    /// Validates every parameter set and the grid against the configured
    /// resolution. Nothing is checked again once stepping starts.
    pub fn new(
        state: GridState,
        scenario: ScenarioParameters,
        poisson: PoissonParameters,
        save: &SaveParameters,
    ) -> Result<Self, SolverError> {
        scenario.validate()?;
        poisson.validate()?;
        save.validate()?;
        state.masks().check_dimensions(scenario.dimensions())?;

        let checkpoint_interval = save.checkpoint_interval(state.dimensions.cell_count());

        Ok(Self {
            state,
            scenario,
            poisson,
            checkpoint_interval,
            step: 0,
            time: 0.0,
            chunk_index: 0,
            dispatcher: None,
            stop: StopHandle::default(),
        })
    }

    pub fn from_config(config: &SimulationConfig) -> Result<Self, SolverError> {
        config.validate()?;
        let dimensions = config.scenario.dimensions();
        let masks = config.layout.build_masks(dimensions)?;
        let state = GridState::new(dimensions, masks, config.scenario.constant_velocity())?;
        Self::new(state, config.scenario.clone(), config.poisson.clone(), &config.save)
    }

    /// Routes checkpoints to `sink` on a background thread.
    pub fn with_checkpoint_sink<S>(mut self, sink: S) -> Result<Self, SolverError>
    where
        S: CheckpointSink + 'static,
    {
        self.dispatcher = Some(CheckpointDispatcher::spawn(sink)?);
        Ok(self)
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    pub fn checkpoint_interval(&self) -> usize {
        self.checkpoint_interval
    }

    pub fn steps_completed(&self) -> usize {
        self.step
    }

    pub fn time(&self) -> f64 {
        self.time
    }

    /// Boundary conditions, predictor, pressure solve, corrector; then
    /// advances the clock by `dt`.
    pub fn step(&mut self) -> StepReport {
        self.state.apply_boundary_conditions();
        predictor::solve(&mut self.state, &self.scenario);
        let poisson = solve_pressure(&mut self.state, &self.poisson);
        corrector::solve(&mut self.state, &self.scenario);

        self.step += 1;
        self.time += self.scenario.dt;

        StepReport {
            step: self.step,
            time: self.time,
            poisson,
            divergence: total_abs_divergence(&self.state),
        }
    }

    /// Steps until the configured iteration count is reached or the stop
    /// handle fires, checkpointing every `checkpoint_interval` steps. Pending
    /// checkpoints are drained before returning. Checkpoint failures are
    /// logged and counted, never returned.
    pub fn run(&mut self) -> Result<RunSummary, SolverError> {
        let GridDimensions2D(nx, ny) = self.state.dimensions;
        let span = info_span!("simulation_run", nx, ny);
        let _enter = span.enter();

        let iterations = self.scenario.iterations;
        info!(
            iterations,
            dt = self.scenario.dt,
            checkpoint_interval = self.checkpoint_interval,
            "Starting simulation"
        );
        let start = Instant::now();

        let mut stopped_early = false;
        let mut unconverged_steps = 0;
        let mut checkpoints_dispatched = 0;
        let mut checkpoints_dropped = 0;
        let checkpointing = self.dispatcher.is_some();
        let mut last_step = None;

        while self.step < iterations {
            if self.stop.is_stopped() {
                warn!(step = self.step, "Stop requested, ending run early");
                stopped_early = true;
                break;
            }

            let report = self.step();
            if !report.poisson.converged {
                unconverged_steps += 1;
            }
            debug!(
                step = report.step,
                time = report.time,
                sweeps = report.poisson.total_sweeps(),
                max_error = report.poisson.max_error,
                divergence = report.divergence,
                "Step complete"
            );

            if checkpointing && report.step % self.checkpoint_interval == 0 {
                match self.dispatch_checkpoint() {
                    Ok(()) => checkpoints_dispatched += 1,
                    Err(e) => {
                        checkpoints_dropped += 1;
                        warn!(step = report.step, "Checkpoint not dispatched: {}", e);
                        if matches!(e, CheckpointError::DispatcherClosed) {
                            // Joins the dead worker; later checkpoints count as dropped.
                            self.dispatcher = None;
                        }
                    }
                }
            }
            last_step = Some(report);
        }

        let dispatch = match self.dispatcher.take().map(CheckpointDispatcher::finish) {
            Some(Ok(stats)) => Some(stats),
            Some(Err(e)) => {
                warn!("Checkpoint worker ended abnormally: {}", e);
                None
            }
            None => None,
        };

        info!(
            steps = self.step,
            time = self.time,
            unconverged_steps,
            "Simulation finished in {:.2}s",
            start.elapsed().as_secs_f64()
        );

        Ok(RunSummary {
            steps_completed: self.step,
            time: self.time,
            checkpoints_dispatched,
            checkpoints_dropped,
            stopped_early,
            unconverged_steps,
            last_step,
            dispatch,
        })
    }

    /// Chunk indices advance even when a checkpoint is dropped, so a gap in
    /// the written chunks marks the loss.
    fn dispatch_checkpoint(&mut self) -> Result<(), CheckpointError> {
        self.state.update_cell_centered();
        let checkpoint = Checkpoint::capture(&self.state, self.chunk_index, self.step, self.time);
        self.chunk_index += 1;
        match &self.dispatcher {
            Some(dispatcher) => dispatcher.dispatch(checkpoint),
            None => Err(CheckpointError::DispatcherClosed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::mask::Masks;
    use crate::config::Layout;
    use crate::error::{ConfigError, GridError};
    use approx::assert_relative_eq;
    use std::sync::Mutex;

    fn cavity_scenario(resolution: usize, iterations: usize) -> ScenarioParameters {
        ScenarioParameters {
            resolution,
            dt: 0.001,
            iterations,
            velocity_x: 1.0,
            velocity_y: 0.0,
            density: 1.0,
            viscosity: 0.001,
            ..Default::default()
        }
    }

    fn cavity(resolution: usize, iterations: usize, poisson: PoissonParameters) -> Simulation {
        let config = SimulationConfig {
            scenario: cavity_scenario(resolution, iterations),
            poisson,
            ..Default::default()
        };
        Simulation::from_config(&config).unwrap()
    }

    #[derive(Clone, Default)]
    struct Recorder(Arc<Mutex<Vec<(usize, usize, usize, usize)>>>);

    impl CheckpointSink for Recorder {
        fn on_checkpoint(&mut self, checkpoint: &Checkpoint) -> Result<(), CheckpointError> {
            self.0.lock().unwrap().push((
                checkpoint.chunk_index,
                checkpoint.step,
                checkpoint.velx.nrows(),
                checkpoint.velx.ncols(),
            ));
            Ok(())
        }
    }

    #[test]
    fn test_rejects_invalid_parameters() {
        let dims = GridDimensions2D(4, 4);
        let state = GridState::new(dims, Masks::lid_driven_cavity(4).unwrap(), (1.0, 0.0)).unwrap();
        let scenario = ScenarioParameters { density: 0.0, ..cavity_scenario(4, 1) };

        let result = Simulation::new(state, scenario, PoissonParameters::default(), &SaveParameters::default());

        assert!(matches!(result, Err(SolverError::Config(ConfigError::InvalidParameter(_)))));
    }

    #[test]
    fn test_rejects_grid_of_wrong_resolution() {
        let dims = GridDimensions2D(5, 5);
        let state = GridState::new(dims, Masks::lid_driven_cavity(5).unwrap(), (1.0, 0.0)).unwrap();

        let result = Simulation::new(
            state,
            cavity_scenario(4, 1),
            PoissonParameters::default(),
            &SaveParameters::default(),
        );

        assert!(matches!(
            result,
            Err(SolverError::Grid(GridError::MaskDimensionMismatch { .. }))
        ));
    }

    #[test]
    fn test_run_advances_time() {
        let mut simulation = cavity(4, 5, PoissonParameters::default());

        let summary = simulation.run().unwrap();

        assert_eq!(summary.steps_completed, 5);
        assert!(!summary.stopped_early);
        assert_relative_eq!(summary.time, 0.005, epsilon = 1e-12);
        assert_eq!(summary.last_step.map(|report| report.step), Some(5));
        assert_eq!(summary.checkpoints_dispatched, 0);
        assert!(summary.dispatch.is_none());
        // The lid is never overwritten.
        assert_eq!(simulation.state.u[(0, 2)], 1.0);
    }

    #[test]
    fn test_checkpoints_every_interval() {
        let recorder = Recorder::default();
        let config = SimulationConfig {
            scenario: cavity_scenario(4, 6),
            save: SaveParameters {
                chunk_dimensions: [4, 4, 2],
                ..Default::default()
            },
            ..Default::default()
        };
        let mut simulation = Simulation::from_config(&config)
            .unwrap()
            .with_checkpoint_sink(recorder.clone())
            .unwrap();
        assert_eq!(simulation.checkpoint_interval(), 2);

        let summary = simulation.run().unwrap();

        assert_eq!(summary.checkpoints_dispatched, 3);
        assert_eq!(summary.dispatch, Some(DispatchStats { written: 3, failed: 0 }));
        assert_eq!(
            *recorder.0.lock().unwrap(),
            vec![(0, 2, 4, 4), (1, 4, 4, 4), (2, 6, 4, 4)]
        );
    }

    struct Panicking;

    impl CheckpointSink for Panicking {
        fn on_checkpoint(&mut self, _: &Checkpoint) -> Result<(), CheckpointError> {
            panic!("sink failure");
        }
    }

    #[test]
    fn test_dead_checkpoint_worker_does_not_stop_run() {
        let config = SimulationConfig {
            scenario: cavity_scenario(4, 12),
            save: SaveParameters {
                chunk_dimensions: [4, 4, 1],
                ..Default::default()
            },
            ..Default::default()
        };
        let mut simulation = Simulation::from_config(&config)
            .unwrap()
            .with_checkpoint_sink(Panicking)
            .unwrap();
        assert_eq!(simulation.checkpoint_interval(), 1);

        let summary = simulation.run().unwrap();

        assert_eq!(summary.steps_completed, 12);
        assert!(!summary.stopped_early);
        assert_eq!(summary.checkpoints_dispatched + summary.checkpoints_dropped, 12);
        assert!(summary.dispatch.is_none());
    }

    #[test]
    fn test_unconverged_steps_are_counted() {
        let poisson = PoissonParameters {
            tolerance: 1e-14,
            min_iterations: 1,
            max_iterations: 1,
            ..Default::default()
        };
        let mut simulation = cavity(4, 3, poisson);

        let summary = simulation.run().unwrap();

        assert_eq!(summary.steps_completed, 3);
        assert_eq!(summary.unconverged_steps, 3);
        let last = summary.last_step.unwrap();
        assert!(!last.poisson.converged);
        assert_eq!(last.poisson.sweeps, 1);
    }

    #[test]
    fn test_channel_run_with_outflow() {
        let config = SimulationConfig {
            scenario: cavity_scenario(8, 5),
            poisson: PoissonParameters {
                error: 0.001,
                tolerance: 1e-10,
                min_iterations: 1,
                max_iterations: 20_000,
            },
            layout: Layout::Channel,
            ..Default::default()
        };
        let mut simulation = Simulation::from_config(&config).unwrap();

        let summary = simulation.run().unwrap();
        assert_eq!(summary.steps_completed, 5);
        assert_eq!(summary.unconverged_steps, 0);

        let state = &simulation.state;
        for field in [&state.u, &state.v, &state.p0] {
            assert!(field.iter().all(|value| value.is_finite()));
        }
        // Inflow column is never overwritten; fluid has entered the channel.
        assert_eq!(state.u[(4, 0)], 1.0);
        assert!(state.u[(4, 1)] > 0.0);

        let scenario = simulation.scenario.clone();
        let poisson = simulation.poisson.clone();
        let state = &mut simulation.state;
        state.apply_boundary_conditions();
        // Outflow cells carry the column just inside them.
        for i in 1..=8 {
            assert_eq!(state.u[(i, 8)], state.u[(i, 7)]);
        }
        predictor::solve(state, &scenario);
        solve_pressure(state, &poisson);
        let before = total_abs_divergence(state);
        corrector::solve(state, &scenario);
        let after = total_abs_divergence(state);

        assert!(before > 0.0);
        assert!(after < before, "divergence {before} -> {after}");
    }

    #[test]
    fn test_stop_handle_ends_run() {
        let mut simulation = cavity(4, 100, PoissonParameters::default());
        simulation.stop_handle().stop();

        let summary = simulation.run().unwrap();

        assert!(summary.stopped_early);
        assert_eq!(summary.steps_completed, 0);
        assert!(summary.last_step.is_none());
    }

    #[test]
    fn test_corrector_reduces_divergence() {
        let poisson = PoissonParameters {
            error: 0.001,
            tolerance: 1e-10,
            min_iterations: 1,
            max_iterations: 20_000,
        };
        let mut simulation = cavity(8, 3, poisson);
        simulation.run().unwrap();

        let scenario = simulation.scenario.clone();
        let poisson = simulation.poisson.clone();
        let state = &mut simulation.state;
        state.apply_boundary_conditions();
        predictor::solve(state, &scenario);
        solve_pressure(state, &poisson);
        let before = total_abs_divergence(state);
        corrector::solve(state, &scenario);
        let after = total_abs_divergence(state);

        assert!(before > 0.0);
        assert!(after < before, "divergence {before} -> {after}");
    }

    #[test]
    fn test_walls_never_modified() {
        let masks = Masks::from_ascii(
            "
            #........#
            #........#
            #........#
            #...##...#
            #...##...#
            #........#
            #........#
            #........#
            #........#
            ##########
            ",
        )
        .unwrap();
        let dims = GridDimensions2D(8, 8);
        let mut state = GridState::new(dims, masks, (1.0, 0.0)).unwrap();
        // Give the walls values that no stage would produce.
        for j in 0..10 {
            for i in 0..10 {
                if state.is_wall(i, j) {
                    state.p0[(i, j)] = 42.0;
                    state.p1[(i, j)] = 42.0;
                }
            }
        }
        let mut simulation = Simulation::new(
            state,
            cavity_scenario(8, 0),
            PoissonParameters::default(),
            &SaveParameters::default(),
        )
        .unwrap();

        for _ in 0..5 {
            simulation.state.apply_boundary_conditions();
            let (u_before, v_before) = (simulation.state.u.clone(), simulation.state.v.clone());

            predictor::solve(&mut simulation.state, &simulation.scenario);
            solve_pressure(&mut simulation.state, &simulation.poisson);
            corrector::solve(&mut simulation.state, &simulation.scenario);

            let state = &simulation.state;
            for j in 0..10 {
                for i in 0..10 {
                    if state.is_wall(i, j) {
                        assert_eq!(state.u[(i, j)], u_before[(i, j)]);
                        assert_eq!(state.v[(i, j)], v_before[(i, j)]);
                        assert_eq!(state.p0[(i, j)], 42.0);
                        assert_eq!(state.p1[(i, j)], 42.0);
                    }
                }
            }
        }
    }
}
