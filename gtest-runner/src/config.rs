// Copyright (c) The gtest-runner Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Runner configuration.
//!
//! The config is layered: the embedded default config comes first, then
//! `.config/gtest-runner.toml` under the workspace root (or an explicitly passed file).

use crate::{
    errors::{ConfigParseError, ConfigParseErrorKind},
    runner::TestRunnerBuilder,
    suite_policy::detect_ci,
};
use camino::Utf8Path;
use config::{Config, ConfigBuilder, ConfigError, File, FileFormat, builder::DefaultState};
use serde::Deserialize;
use std::{collections::BTreeSet, time::Duration};
use tracing::warn;

/// Settings for a [`TestRunner`](crate::runner::TestRunner), read from config files.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub struct RunnerConfig {
    /// The base per-marker timeout. Zero means 60 seconds.
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,

    /// Extra arguments passed through to the test binary.
    pub test_arguments: String,

    /// Whether CI timeouts apply.
    pub ci: CiMode,
}

impl RunnerConfig {
    /// The default location of the config within the workspace root.
    pub const CONFIG_PATH: &'static str = ".config/gtest-runner.toml";

    /// Contains the default config as a TOML file.
    ///
    /// Repository-specific configuration is layered on top of the default config.
    pub const DEFAULT_CONFIG: &'static str = include_str!("../default-config.toml");

    /// Reads the config from the default location and the given file, if any.
    ///
    /// If `config_file` is `None`, `workspace_root/.config/gtest-runner.toml` is read if it exists.
    /// An explicitly passed file must exist. Unknown keys are logged and otherwise ignored.
    pub fn from_sources(
        workspace_root: impl AsRef<Utf8Path>,
        config_file: Option<&Utf8Path>,
    ) -> Result<Self, ConfigParseError> {
        let (config_file, source) = match config_file {
            Some(file) => (file.to_owned(), File::new(file.as_str(), FileFormat::Toml)),
            None => {
                let config_file = workspace_root.as_ref().join(Self::CONFIG_PATH);
                let source = File::new(config_file.as_str(), FileFormat::Toml).required(false);
                (config_file, source)
            }
        };

        let builder = Self::make_default_config().add_source(source);
        let (config, ignored) = Self::build_and_deserialize_config(&builder)
            .map_err(|kind| ConfigParseError::new(&config_file, kind))?;

        for path in ignored {
            warn!(%config_file, key = %path, "ignoring unknown configuration key");
        }

        Ok(config)
    }

    /// Returns the default config.
    pub fn default_config() -> Self {
        let builder = Self::make_default_config();
        let (config, _) =
            Self::build_and_deserialize_config(&builder).expect("default config is always valid");
        config
    }

    /// Creates a [`TestRunnerBuilder`] with these settings applied.
    pub fn builder(&self) -> TestRunnerBuilder {
        let mut builder = TestRunnerBuilder::default();
        builder
            .set_timeout(self.timeout)
            .set_test_arguments(self.test_arguments.clone());
        if let Some(ci) = self.ci.forced() {
            builder.set_ci(ci);
        }
        builder
    }

    fn make_default_config() -> ConfigBuilder<DefaultState> {
        Config::builder().add_source(File::from_str(Self::DEFAULT_CONFIG, FileFormat::Toml))
    }

    // Returns the config and the set of ignored paths.
    fn build_and_deserialize_config(
        builder: &ConfigBuilder<DefaultState>,
    ) -> Result<(Self, BTreeSet<String>), ConfigParseErrorKind> {
        let config = builder
            .build_cloned()
            .map_err(|error| ConfigParseErrorKind::BuildError(Box::new(error)))?;

        let mut ignored = BTreeSet::new();
        let mut cb = |path: serde_ignored::Path| {
            ignored.insert(path.to_string());
        };
        let ignored_de = serde_ignored::Deserializer::new(config, &mut cb);
        let config: RunnerConfig = serde_path_to_error::deserialize(ignored_de).map_err(|error| {
            // serde_path_to_error already tracks the key, so drop it from the config error.
            let path = error.path().clone();
            let error = match error.into_inner() {
                ConfigError::At { error, .. } => *error,
                other => other,
            };
            ConfigParseErrorKind::DeserializeError(Box::new(serde_path_to_error::Error::new(
                path, error,
            )))
        })?;

        Ok((config, ignored))
    }
}

/// Controls whether CI timeouts apply.
#[derive(Copy, Clone, Debug, Default, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub enum CiMode {
    /// Detect CI from the environment.
    #[default]
    Auto,

    /// Always apply CI timeouts.
    Always,

    /// Never apply CI timeouts.
    Never,
}

impl CiMode {
    /// Returns whether CI timeouts apply, detecting from the environment if necessary.
    pub fn resolve(self) -> bool {
        self.forced().unwrap_or_else(detect_ci)
    }

    fn forced(self) -> Option<bool> {
        match self {
            CiMode::Auto => None,
            CiMode::Always => Some(true),
            CiMode::Never => Some(false),
        }
    }
}
