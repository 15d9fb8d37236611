use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::domain::grid2d::GridDimensions2D;
use crate::domain::mask::{Masks, MIN_INTERIOR_CELLS};
use crate::error::{ConfigError, GridError};

const BYTES_PER_GB: f64 = 1024.0 * 1024.0 * 1024.0;

fn require_positive(name: &str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::InvalidParameter(format!(
            "{name} must be positive and finite, got {value}"
        )))
    }
}

fn require_finite(name: &str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(ConfigError::InvalidParameter(format!("{name} must be finite, got {value}")))
    }
}

/// Physical setup of one scenario, in SI units.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScenarioParameters {
    /// Length of the domain along x [m].
    pub domain_x: f64,
    /// Interior cells per axis; the domain is square.
    pub resolution: usize,
    /// Time step [s].
    pub dt: f64,
    /// Number of time steps to run.
    pub iterations: usize,
    /// Velocity of the constant-velocity region [m/s].
    pub velocity_x: f64,
    pub velocity_y: f64,
    /// Density [kg/m^3].
    pub density: f64,
    /// Dynamic viscosity [Pa*s].
    pub viscosity: f64,
}

impl Default for ScenarioParameters {
    fn default() -> Self {
        Self {
            domain_x: 2.0,
            resolution: 200,
            dt: 0.0015,
            iterations: 3000,
            velocity_x: 1.0,
            velocity_y: 0.0,
            density: 1.0,
            viscosity: 1.0 / 1000.0,
        }
    }
}

impl ScenarioParameters {
    pub fn dimensions(&self) -> GridDimensions2D {
        GridDimensions2D(self.resolution, self.resolution)
    }

    pub fn kinematic_viscosity(&self) -> f64 {
        self.viscosity / self.density
    }

    pub fn constant_velocity(&self) -> (f64, f64) {
        (self.velocity_x, self.velocity_y)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        require_positive("domain_x", self.domain_x)?;
        require_positive("dt", self.dt)?;
        require_positive("density", self.density)?;
        require_finite("viscosity", self.viscosity)?;
        if self.viscosity < 0.0 {
            return Err(ConfigError::InvalidParameter(format!(
                "viscosity must not be negative, got {}",
                self.viscosity
            )));
        }
        require_finite("velocity_x", self.velocity_x)?;
        require_finite("velocity_y", self.velocity_y)?;
        if self.resolution < MIN_INTERIOR_CELLS {
            return Err(ConfigError::InvalidParameter(format!(
                "resolution must be at least {MIN_INTERIOR_CELLS}, got {}",
                self.resolution
            )));
        }
        Ok(())
    }
}

/// Jacobi pressure solve controls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoissonParameters {
    /// Divides the velocity divergence to form the Poisson source term. The
    /// projection is exact when this equals `dt / density` of the scenario.
    pub error: f64,
    /// Largest per-sweep pressure change accepted as converged.
    pub tolerance: f64,
    /// Sweeps always performed after the convergence loop.
    pub min_iterations: usize,
    /// Upper bound on convergence-loop sweeps.
    pub max_iterations: usize,
}

impl Default for PoissonParameters {
    fn default() -> Self {
        Self {
            error: 0.001,
            tolerance: 1e-4,
            min_iterations: 1,
            max_iterations: 1000,
        }
    }
}

impl PoissonParameters {
    pub fn validate(&self) -> Result<(), ConfigError> {
        require_positive("poisson.error", self.error)?;
        require_positive("poisson.tolerance", self.tolerance)?;
        if self.max_iterations == 0 {
            return Err(ConfigError::InvalidParameter(
                "poisson.max_iterations must be at least 1".to_string(),
            ));
        }
        if self.min_iterations > self.max_iterations {
            return Err(ConfigError::InvalidParameter(format!(
                "poisson.min_iterations ({}) exceeds max_iterations ({})",
                self.min_iterations, self.max_iterations
            )));
        }
        Ok(())
    }
}

/// Controls how often velocity snapshots are handed to the checkpoint hook.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SaveParameters {
    /// Disk budget for checkpoint sinks that write files [GB].
    pub space_limit_gb: f64,
    /// Size of one stored chunk; its volume divided by the cell count gives
    /// the number of steps between checkpoints.
    pub chunk_dimensions: [usize; 3],
}

impl Default for SaveParameters {
    fn default() -> Self {
        Self {
            space_limit_gb: 5.0,
            chunk_dimensions: [100, 100, 500],
        }
    }
}

impl SaveParameters {
    /// Saturates at `usize::MAX`; `validate` rejects dimensions that overflow.
    pub fn chunk_volume(&self) -> usize {
        self.checked_chunk_volume().unwrap_or(usize::MAX)
    }

    fn checked_chunk_volume(&self) -> Option<usize> {
        self.chunk_dimensions
            .iter()
            .try_fold(1usize, |volume, &extent| volume.checked_mul(extent))
    }

    /// Steps between checkpoints, never less than one.
    pub fn checkpoint_interval(&self, cell_count: usize) -> usize {
        let steps = (self.chunk_volume() as f64 / cell_count.max(1) as f64).round() as usize;
        steps.max(1)
    }

    pub fn space_limit_bytes(&self) -> u64 {
        (self.space_limit_gb * BYTES_PER_GB) as u64
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        require_positive("save.space_limit_gb", self.space_limit_gb)?;
        if self.chunk_dimensions.contains(&0) {
            return Err(ConfigError::InvalidParameter(format!(
                "save.chunk_dimensions must all be non-zero, got {:?}",
                self.chunk_dimensions
            )));
        }
        if self.checked_chunk_volume().is_none() {
            return Err(ConfigError::InvalidParameter(format!(
                "save.chunk_dimensions {:?} overflow the chunk volume",
                self.chunk_dimensions
            )));
        }
        Ok(())
    }
}

/// Where the cell masks come from.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Layout {
    #[default]
    LidDrivenCavity,
    Channel,
    /// Rows of `#` (wall), `.` (fluid) and `o` (outflow), ghost ring included.
    Ascii { rows: Vec<String> },
}

impl Layout {
    pub fn build_masks(&self, dimensions: GridDimensions2D) -> Result<Masks, GridError> {
        let masks = match self {
            Layout::LidDrivenCavity => Masks::lid_driven_cavity(dimensions.0)?,
            Layout::Channel => Masks::channel(dimensions)?,
            Layout::Ascii { rows } => Masks::from_ascii(&rows.join("\n"))?,
        };
        masks.check_dimensions(dimensions)?;
        Ok(masks)
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub scenario: ScenarioParameters,
    pub poisson: PoissonParameters,
    pub save: SaveParameters,
    pub layout: Layout,
}

impl SimulationConfig {
    pub fn from_json_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json_str(&text)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.scenario.validate()?;
        self.poisson.validate()?;
        self.save.validate()
    }
}
