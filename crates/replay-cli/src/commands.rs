//! Command implementations for the Replay CLI.

use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};
use replay_cache::machine_getter;
use replay_core::MachineCacheConfig;
use replay_runtime::ExecutionRun;
use replay_vm::{Program, Vm};
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Load a program from a JSON file.
pub fn load_program(path: &Path) -> Result<Program> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read program {}", path.display()))?;
    Program::from_json(&raw).with_context(|| format!("invalid program {}", path.display()))
}

/// Load a cache configuration, falling back to defaults.
pub fn load_config(path: Option<&Path>) -> Result<MachineCacheConfig> {
    let Some(path) = path else {
        return Ok(MachineCacheConfig::default());
    };
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read config {}", path.display()))?;
    let config: MachineCacheConfig = serde_json::from_str(&raw)
        .with_context(|| format!("invalid config {}", path.display()))?;
    config.validate()?;
    Ok(config)
}

/// Open an execution run over the program at `program_path`.
pub fn open_run(program_path: &Path, config_path: Option<&Path>) -> Result<ExecutionRun<Vm>> {
    let program = load_program(program_path)?;
    let config = load_config(config_path)?;
    info!(
        instructions = program.len(),
        checkpoint_interval = config.checkpoint_interval,
        max_checkpoints = config.max_checkpoints,
        "opening execution run"
    );

    let genesis = Vm::new(program);
    let getter = machine_getter(move |_| {
        let genesis = genesis.clone();
        async move { Ok(genesis) }
    });
    Ok(ExecutionRun::new(&CancellationToken::new(), getter, config)?)
}

pub async fn step(run: &ExecutionRun<Vm>, position: u64) -> Result<Value> {
    let result = run.step_at(position).wait_uncancellable().await?;
    Ok(serde_json::to_value(result)?)
}

pub async fn last(run: &ExecutionRun<Vm>) -> Result<Value> {
    let result = run.last_step().wait_uncancellable().await?;
    Ok(serde_json::to_value(result)?)
}

pub async fn proof(run: &ExecutionRun<Vm>, position: u64) -> Result<Value> {
    let proof = run.proof_at(position).wait_uncancellable().await?;
    Ok(json!({
        "position": position,
        "proof": format!("0x{}", hex::encode(proof)),
    }))
}

pub async fn bisect(run: &ExecutionRun<Vm>, start: u64, end: u64, degree: u64) -> Result<Value> {
    let points = probe_points(start, end, degree)?;
    run.prepare_range(start, end)
        .await
        .with_context(|| format!("failed to prepare range [{}, {})", start, end))?;

    let promises: Vec<_> = points.iter().map(|&p| run.step_at(p)).collect();
    let mut probes = Vec::with_capacity(promises.len());
    for promise in promises {
        probes.push(serde_json::to_value(promise.wait_uncancellable().await?)?);
    }

    Ok(json!({
        "start": start,
        "end": end,
        "probes": probes,
    }))
}

/// Evenly spaced positions covering `[start, end)`, both ends included.
pub fn probe_points(start: u64, end: u64, degree: u64) -> Result<Vec<u64>> {
    if degree == 0 {
        bail!("degree must be at least 1");
    }
    if end <= start {
        bail!("window [{}, {}) is empty", start, end);
    }
    let last = end - 1;
    let span = u128::from(last - start);
    let mut points: Vec<u64> = (0..=degree)
        .map(|i| start + (span * u128::from(i) / u128::from(degree)) as u64)
        .collect();
    points.dedup();
    Ok(points)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn probe_points_split_window_evenly() {
        assert_eq!(probe_points(0, 101, 4).unwrap(), vec![0, 25, 50, 75, 100]);
        assert_eq!(probe_points(50, 150, 2).unwrap(), vec![50, 99, 149]);
        assert_eq!(probe_points(7, 8, 3).unwrap(), vec![7]);
    }

    #[test]
    fn probe_points_reject_bad_input() {
        assert!(probe_points(5, 5, 2).is_err());
        assert!(probe_points(0, 10, 0).is_err());
    }

    #[test]
    fn missing_config_uses_defaults() {
        assert_eq!(load_config(None).unwrap(), MachineCacheConfig::default());
    }

    #[test]
    fn invalid_config_is_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"checkpoint-interval": 0}}"#).unwrap();
        assert!(load_config(Some(file.path())).is_err());
    }

    #[tokio::test]
    async fn step_command_reports_position_and_status() {
        let mut program = tempfile::NamedTempFile::new().unwrap();
        write!(program, r#"{{"code": ["nop", "nop", "nop"]}}"#).unwrap();

        let run = open_run(program.path(), None).unwrap();
        let output = step(&run, 7).await.unwrap();
        assert_eq!(output["position"], 3);
        assert_eq!(output["status"], "finished");

        let window = bisect(&run, 1, 3, 2).await.unwrap();
        assert_eq!(window["probes"].as_array().unwrap().len(), 2);
        run.close();
    }
}
