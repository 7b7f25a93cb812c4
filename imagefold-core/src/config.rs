//! Environment-backed configuration
//!
//! Each consumer gets its own small record instead of one global bag of
//! variables: [`AcquisitionConfig`] for the download, [`DataLoaderConfig`]
//! for batching, [`PlatformIdentity`] for the managed ML workspace,
//! [`DatasetRegistration`] and [`TrainingEnvironment`] for what the training
//! pipeline registers there, [`PipelinePaths`] for the surrounding training
//! scripts and [`PrepareOptions`] for the `imagefold-prepare` binary.
//!
//! Every record can be built from the process environment (`from_env`) or
//! from any key lookup (`from_lookup`), so nothing here needs a real
//! environment to be tested.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::debug;

use crate::acquire::AcquisitionConfig;
use crate::data::DataLoaderConfig;
use crate::error::{ImageFoldError, Result};
use crate::storage::HttpConfig;

/// Load a dotenv file into the process environment.
///
/// Variables already present in the environment win. A missing file is not
/// an error; returns whether a file was loaded.
pub fn load_dotenv(path: impl AsRef<Path>) -> Result<bool> {
    let path = path.as_ref();
    if !path.is_file() {
        debug!("No dotenv file at {}", path.display());
        return Ok(false);
    }

    dotenv::from_path(path).map_err(|e| ImageFoldError::Config {
        key: path.display().to_string(),
        reason: e.to_string(),
    })?;

    debug!("Loaded dotenv file {}", path.display());
    Ok(true)
}

/// Typed reads over a key lookup
struct EnvReader<'a> {
    lookup: &'a dyn Fn(&str) -> Option<String>,
}

impl<'a> EnvReader<'a> {
    fn new(lookup: &'a dyn Fn(&str) -> Option<String>) -> Self {
        Self { lookup }
    }

    /// Trimmed value; empty strings count as unset
    fn string(&self, key: &str) -> Option<String> {
        (self.lookup)(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn string_or(&self, key: &str, default: &str) -> String {
        self.string(key).unwrap_or_else(|| default.to_string())
    }

    fn parse<T>(&self, key: &str) -> Result<Option<T>>
    where
        T: FromStr,
        T::Err: fmt::Display,
    {
        match self.string(key) {
            None => Ok(None),
            Some(raw) => raw.parse::<T>().map(Some).map_err(|e| ImageFoldError::Config {
                key: key.into(),
                reason: format!("cannot parse '{}': {}", raw, e),
            }),
        }
    }

    fn flag(&self, key: &str) -> Result<Option<bool>> {
        match self.string(key) {
            None => Ok(None),
            Some(raw) => parse_flag(&raw).map(Some).ok_or_else(|| ImageFoldError::Config {
                key: key.into(),
                reason: format!("expected a boolean, got '{}'", raw),
            }),
        }
    }

    fn checksum(&self, key: &str) -> Result<Option<u32>> {
        match self.string(key) {
            None => Ok(None),
            Some(raw) => parse_checksum(&raw).map(Some).ok_or_else(|| ImageFoldError::Config {
                key: key.into(),
                reason: format!("expected a CRC32C as hex (0x...) or decimal, got '{}'", raw),
            }),
        }
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn parse_checksum(raw: &str) -> Option<u32> {
    match raw.strip_prefix("0x").or_else(|| raw.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16).ok(),
        None => raw.parse().ok(),
    }
}

fn process_env(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

impl AcquisitionConfig {
    /// Read from the process environment
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(process_env)
    }

    /// Read from an arbitrary key lookup, falling back to defaults
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = EnvReader::new(&lookup);
        let defaults = AcquisitionConfig::default();
        let http_defaults = HttpConfig::default();

        Ok(Self {
            download_url: env.string_or("DOWNLOAD_URL", &defaults.download_url),
            archive_path: env
                .string("ARCHIVE_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.archive_path),
            extract_dir: env
                .string("DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.extract_dir),
            expected_root: env.string("DATASET_ROOT"),
            expected_crc32c: env.checksum("ARCHIVE_CRC32C")?,
            http: HttpConfig {
                connect_timeout_secs: env
                    .parse("HTTP_CONNECT_TIMEOUT_SECS")?
                    .unwrap_or(http_defaults.connect_timeout_secs),
                request_timeout_secs: env
                    .parse("HTTP_REQUEST_TIMEOUT_SECS")?
                    .unwrap_or(http_defaults.request_timeout_secs),
            },
        })
    }
}

impl DataLoaderConfig {
    /// Read from the process environment
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(process_env)
    }

    /// Read from an arbitrary key lookup, falling back to defaults
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = EnvReader::new(&lookup);
        let defaults = DataLoaderConfig::default();

        let batch_size: usize = env.parse("BATCH_SIZE")?.unwrap_or(defaults.batch_size);
        if batch_size == 0 {
            return Err(ImageFoldError::Config {
                key: "BATCH_SIZE".into(),
                reason: "must be at least 1".into(),
            });
        }

        Ok(Self {
            batch_size,
            num_workers: env.parse("NUM_WORKERS")?.unwrap_or(defaults.num_workers),
            prefetch_batches: env
                .parse::<usize>("PREFETCH_BATCHES")?
                .unwrap_or(defaults.prefetch_batches)
                .max(1),
            shuffle_train: defaults.shuffle_train,
            shuffle_val: env.flag("SHUFFLE_VAL")?.unwrap_or(defaults.shuffle_val),
            seed: env.parse("SHUFFLE_SEED")?,
        })
    }
}

/// Identity of the managed ML workspace the training scripts talk to.
///
/// Carried, never used by this crate.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct PlatformIdentity {
    pub tenant_id: Option<String>,
    pub subscription_id: Option<String>,
    pub resource_group: Option<String>,
    pub workspace_name: Option<String>,
    pub experiment_name: Option<String>,
    pub sp_app_id: Option<String>,
    #[serde(skip_serializing)]
    pub sp_app_secret: Option<String>,
    pub compute_name: Option<String>,
    pub vm_size: Option<String>,
    pub build_id: Option<String>,
    pub model_name: Option<String>,
}

impl PlatformIdentity {
    pub fn from_env() -> Self {
        Self::from_lookup(process_env)
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = EnvReader::new(&lookup);
        Self {
            tenant_id: env.string("TENANT_ID"),
            subscription_id: env.string("SUBSCRIPTION_ID"),
            resource_group: env.string("RESOURCE_GROUP"),
            workspace_name: env.string("WORKSPACE_NAME"),
            experiment_name: env.string("EXPERIMENT_NAME"),
            sp_app_id: env.string("SP_APP_ID"),
            sp_app_secret: env.string("SP_APP_SECRET"),
            compute_name: env.string("AML_COMPUTE_CLUSTER_NAME"),
            vm_size: env.string("AML_COMPUTE_CLUSTER_GPU_SKU"),
            build_id: env.string("BUILD_ID"),
            model_name: env.string("MODEL_NAME"),
        }
    }

    /// Return a field's value or a config error naming its variable
    pub fn require(&self, field: IdentityField) -> Result<&str> {
        let value = match field {
            IdentityField::TenantId => &self.tenant_id,
            IdentityField::SubscriptionId => &self.subscription_id,
            IdentityField::ResourceGroup => &self.resource_group,
            IdentityField::WorkspaceName => &self.workspace_name,
            IdentityField::ExperimentName => &self.experiment_name,
            IdentityField::SpAppId => &self.sp_app_id,
            IdentityField::SpAppSecret => &self.sp_app_secret,
            IdentityField::ComputeName => &self.compute_name,
            IdentityField::VmSize => &self.vm_size,
            IdentityField::BuildId => &self.build_id,
            IdentityField::ModelName => &self.model_name,
        };
        value.as_deref().ok_or_else(|| ImageFoldError::Config {
            key: field.env_key().into(),
            reason: "not set".into(),
        })
    }

    /// Whether service-principal credentials are present
    pub fn has_service_principal(&self) -> bool {
        self.tenant_id.is_some() && self.sp_app_id.is_some() && self.sp_app_secret.is_some()
    }
}

impl fmt::Debug for PlatformIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlatformIdentity")
            .field("tenant_id", &self.tenant_id)
            .field("subscription_id", &self.subscription_id)
            .field("resource_group", &self.resource_group)
            .field("workspace_name", &self.workspace_name)
            .field("experiment_name", &self.experiment_name)
            .field("sp_app_id", &self.sp_app_id)
            .field("sp_app_secret", &self.sp_app_secret.as_ref().map(|_| "<redacted>"))
            .field("compute_name", &self.compute_name)
            .field("vm_size", &self.vm_size)
            .field("build_id", &self.build_id)
            .field("model_name", &self.model_name)
            .finish()
    }
}

/// Fields of [`PlatformIdentity`], for [`PlatformIdentity::require`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentityField {
    TenantId,
    SubscriptionId,
    ResourceGroup,
    WorkspaceName,
    ExperimentName,
    SpAppId,
    SpAppSecret,
    ComputeName,
    VmSize,
    BuildId,
    ModelName,
}

impl IdentityField {
    /// Environment variable backing this field
    pub fn env_key(&self) -> &'static str {
        match self {
            IdentityField::TenantId => "TENANT_ID",
            IdentityField::SubscriptionId => "SUBSCRIPTION_ID",
            IdentityField::ResourceGroup => "RESOURCE_GROUP",
            IdentityField::WorkspaceName => "WORKSPACE_NAME",
            IdentityField::ExperimentName => "EXPERIMENT_NAME",
            IdentityField::SpAppId => "SP_APP_ID",
            IdentityField::SpAppSecret => "SP_APP_SECRET",
            IdentityField::ComputeName => "AML_COMPUTE_CLUSTER_NAME",
            IdentityField::VmSize => "AML_COMPUTE_CLUSTER_GPU_SKU",
            IdentityField::BuildId => "BUILD_ID",
            IdentityField::ModelName => "MODEL_NAME",
        }
    }
}

/// Paths and names used by the training pipeline scripts
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelinePaths {
    pub data_dir: Option<PathBuf>,
    pub datastore_target_dir: Option<String>,
    pub src_dir: Option<PathBuf>,
    pub pipeline_name: Option<String>,
    pub train_script: Option<PathBuf>,
    pub evaluate_script: Option<PathBuf>,
    pub register_script: Option<PathBuf>,
}

impl PipelinePaths {
    pub fn from_env() -> Self {
        Self::from_lookup(process_env)
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = EnvReader::new(&lookup);
        Self {
            data_dir: env.string("DATA_DIR").map(PathBuf::from),
            datastore_target_dir: env.string("DATASTORE_TARGET_DIR"),
            src_dir: env.string("SRC_DIR").map(PathBuf::from),
            pipeline_name: env.string("TRAINING_PIPELINE_NAME"),
            train_script: env.string("PIPELINE_TRAIN_SCRIPT_PATH").map(PathBuf::from),
            evaluate_script: env.string("PIPELINE_EVALUATE_SCRIPT_PATH").map(PathBuf::from),
            register_script: env.string("PIPELINE_REGISTER_SCRIPT_PATH").map(PathBuf::from),
        }
    }
}

/// Names under which the dataset is registered with the ML workspace
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetRegistration {
    pub dataset_name: Option<String>,
    pub datastore_name: Option<String>,
    pub dataset_version: Option<String>,
    pub build_uri: Option<String>,
    /// Run the evaluation step of the training pipeline
    pub run_evaluation: bool,
    /// Let the evaluation step cancel a run that does not improve the model
    pub allow_run_cancel: bool,
}

impl Default for DatasetRegistration {
    fn default() -> Self {
        Self {
            dataset_name: None,
            datastore_name: None,
            dataset_version: None,
            build_uri: None,
            run_evaluation: true,
            allow_run_cancel: true,
        }
    }
}

impl DatasetRegistration {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(process_env)
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = EnvReader::new(&lookup);
        let defaults = DatasetRegistration::default();
        Ok(Self {
            dataset_name: env.string("DATASET_NAME"),
            datastore_name: env.string("DATASTORE_NAME"),
            dataset_version: env.string("DATASET_VERSION"),
            build_uri: env.string("BUILD_URI"),
            run_evaluation: env
                .flag("PIPELINE_RUN_EVALUATION")?
                .unwrap_or(defaults.run_evaluation),
            allow_run_cancel: env
                .flag("PIPELINE_ALLOW_RUN_CANCEL")?
                .unwrap_or(defaults.allow_run_cancel),
        })
    }
}

/// Default conda specification for the training environment
pub const DEFAULT_CONDA_FILE: &str = "environments/conda/training_environment.yml";

/// Training environment the pipeline registers or reuses
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrainingEnvironment {
    pub name: Option<String>,
    pub conda_file: PathBuf,
    /// Rebuild the environment even if one with this name exists
    pub rebuild: bool,
}

impl Default for TrainingEnvironment {
    fn default() -> Self {
        Self {
            name: None,
            conda_file: PathBuf::from(DEFAULT_CONDA_FILE),
            rebuild: false,
        }
    }
}

impl TrainingEnvironment {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(process_env)
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = EnvReader::new(&lookup);
        Ok(Self {
            name: env.string("AML_TRAIN_ENV_NAME"),
            conda_file: env
                .string_or("AML_TRAIN_ENV_CONDA_FILE_PATH", DEFAULT_CONDA_FILE)
                .into(),
            rebuild: env.flag("AML_TRAIN_ENV_REBUILD")?.unwrap_or(false),
        })
    }
}

/// Options of the `imagefold-prepare` binary
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrepareOptions {
    /// Existing dataset directory to use instead of acquiring one
    pub dataset_dir: Option<PathBuf>,
    /// Where to write a preview PNG of the first validation image
    pub preview_path: Option<PathBuf>,
}

impl PrepareOptions {
    pub fn from_env() -> Self {
        Self::from_lookup(process_env)
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = EnvReader::new(&lookup);
        Self {
            dataset_dir: env.string("DATASET_DIR").map(PathBuf::from),
            preview_path: env.string("PREVIEW_PATH").map(PathBuf::from),
        }
    }
}
