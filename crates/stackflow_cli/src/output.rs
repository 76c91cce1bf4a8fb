//! Format-neutral driver writers.
//!
//! The `json` and `yaml` drivers merge every resource labelled with their
//! name into one document and write it to the environment's configured
//! output, or to stdout. Other drivers are out of scope for this tool and
//! are reported as skipped.

use color_eyre::eyre::{Result, WrapErr};
use stackflow_plan::Stack;
use stackflow_policy::Environment;
use stackflow_runtime::{drivers_in_use, merged_resources};
use std::io::Write;
use std::path::PathBuf;
use tracing::{info, warn};

/// Drivers this tool can write
pub const BUILTIN_DRIVERS: [&str; 2] = ["json", "yaml"];

/// Where a driver's output went
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Written {
    /// Written to a file
    File {
        /// Driver name
        driver: String,
        /// Output file
        path: PathBuf,
    },
    /// Printed to stdout
    Stdout {
        /// Driver name
        driver: String,
    },
    /// No writer for this driver
    Skipped {
        /// Driver name
        driver: String,
    },
}

/// Write every driver output of a transformed stack
///
/// # Errors
///
/// Returns error if resources conflict or a file cannot be written
pub fn write_outputs(stack: &Stack, environment: &Environment, stdout: bool) -> Result<Vec<Written>> {
    let mut written = Vec::new();
    for driver in BUILTIN_DRIVERS {
        let Some(document) = merged_resources(stack, driver)? else {
            continue;
        };
        let data = render(driver, &document)?;

        if stdout {
            let mut out = std::io::stdout().lock();
            out.write_all(data.as_bytes())?;
            out.write_all(b"\n")?;
            written.push(Written::Stdout {
                driver: driver.to_string(),
            });
            continue;
        }

        let dir = environment.output_dir(driver);
        std::fs::create_dir_all(&dir)
            .wrap_err_with(|| format!("Cannot create output directory {}", dir.display()))?;
        let path = dir.join(environment.output_file(driver, driver));
        std::fs::write(&path, data).wrap_err_with(|| format!("Cannot write {}", path.display()))?;
        info!("[{}] applied resources to {:?}", driver, path.display().to_string());
        written.push(Written::File {
            driver: driver.to_string(),
            path,
        });
    }

    for driver in drivers_in_use(stack)? {
        if !BUILTIN_DRIVERS.contains(&driver.as_str()) {
            warn!(driver = %driver, "No writer for driver, resources skipped");
            written.push(Written::Skipped { driver });
        }
    }
    Ok(written)
}

/// Serialize a merged document for `driver`
///
/// # Errors
///
/// Returns error if serialization fails
pub fn render(driver: &str, document: &serde_json::Value) -> Result<String> {
    Ok(match driver {
        "yaml" => serde_yaml::to_string(document)?,
        _ => serde_json::to_string_pretty(document)?,
    })
}
