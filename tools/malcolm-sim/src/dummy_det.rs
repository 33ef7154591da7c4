// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Simulated detector.
//!
//! Acquires `nframes` frames of `exposure` seconds each, reporting
//! progress through the status. Configuration sleeps `configureSleep`
//! seconds to mimic a slow device. A run can be paused, retraced by a
//! number of frames while paused, then resumed.

use malcolm::model::{Args, Attribute, DState, Device, Method, VType};
use malcolm::{Error, Result};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Acquisition state shared by the method bodies.
struct Acquisition {
    abort: AtomicBool,
    pause: AtomicBool,
    running: watch::Sender<bool>,
}

impl Acquisition {
    fn new() -> Arc<Self> {
        let (running, _) = watch::channel(false);
        Arc::new(Self {
            abort: AtomicBool::new(false),
            pause: AtomicBool::new(false),
            running,
        })
    }

    fn halted(&self) -> bool {
        self.abort.load(Ordering::SeqCst) || self.pause.load(Ordering::SeqCst)
    }

    /// Wait for the frame loop to notice a halt request.
    async fn stopped(&self) -> Result<()> {
        let mut running = self.running.subscribe();
        running
            .wait_for(|r| !*r)
            .await
            .map(|_| ())
            .map_err(|_| Error::HandlerFailure("Acquisition state lost".into()))
    }
}

/// Check a configuration in isolation, ignoring device state.
fn check_config(args: &Args) -> Result<Value> {
    let nframes = args.i64("nframes")?;
    let exposure = args.f64("exposure")?;
    let configure_sleep = args.f64("configureSleep")?;
    if nframes <= 0 {
        return Err(Error::InvalidArgs(format!("nframes {} should be > 0", nframes)));
    }
    if exposure <= 0.0 {
        return Err(Error::InvalidArgs(format!(
            "exposure {} should be > 0.0",
            exposure
        )));
    }
    if configure_sleep < 0.0 {
        return Err(Error::InvalidArgs(format!(
            "configureSleep {} should be >= 0.0",
            configure_sleep
        )));
    }
    Ok(json!({
        "nframes": nframes,
        "exposure": exposure,
        "configureSleep": configure_sleep,
        "runTime": nframes as f64 * exposure,
    }))
}

fn attribute(device: &Device, name: &str) -> Result<Arc<Attribute>> {
    device
        .attribute(name)
        .cloned()
        .ok_or_else(|| Error::UnknownPath(format!("{}.{}", device.name(), name)))
}

fn int(device: &Device, name: &str) -> Result<i64> {
    Ok(attribute(device, name)?.value().as_i64().unwrap_or(0))
}

async fn configure(device: Arc<Device>, args: Args) -> Result<Option<Value>> {
    check_config(&args)?;
    for name in ["nframes", "exposure", "configureSleep"] {
        if let Some(value) = args.get(name) {
            attribute(&device, name)?.set(value.clone())?;
        }
    }
    attribute(&device, "currentStep")?.set(0)?;
    attribute(&device, "totalSteps")?.set(args.i64("nframes")?)?;
    let status = device.status();
    status.transition(&DState::Configuring, "Configuring started")?;

    let sleep = args.f64("configureSleep")?;
    if sleep > 0.0 {
        tokio::time::sleep(Duration::from_secs_f64(sleep)).await;
    }
    status.transition(&DState::Ready, "Configuring finished")?;
    Ok(None)
}

/// Enter Running and mark the frame loop as live.
fn start(device: &Device, acquisition: &Acquisition, message: &str) -> Result<()> {
    acquisition.abort.store(false, Ordering::SeqCst);
    acquisition.pause.store(false, Ordering::SeqCst);
    acquisition.running.send_replace(true);
    if let Err(e) = device.status().transition(&DState::Running, message) {
        acquisition.running.send_replace(false);
        return Err(e);
    }
    Ok(())
}

/// Acquire frames from `currentStep` until done or halted.
///
/// Returns the step reached. Only a run that completes moves the state on;
/// pause and abort settle the state themselves.
async fn frames(device: Arc<Device>, acquisition: Arc<Acquisition>) -> Result<i64> {
    let result = acquire(&device, &acquisition).await;
    acquisition.running.send_replace(false);
    let step = result?;

    if acquisition.abort.load(Ordering::SeqCst) {
        info!("[{}] Run aborted at frame {}", device.name(), step);
    } else if acquisition.pause.load(Ordering::SeqCst) {
        info!("[{}] Run paused at frame {}", device.name(), step);
    } else {
        device
            .status()
            .transition(&DState::Idle, "Running in progress 100% done")?;
    }
    Ok(step)
}

async fn acquire(device: &Device, acquisition: &Acquisition) -> Result<i64> {
    let total = int(device, "totalSteps")?;
    let exposure = attribute(device, "exposure")?.value().as_f64().unwrap_or(0.0);
    let current = attribute(device, "currentStep")?;
    let mut step = current.value().as_i64().unwrap_or(0);

    while step < total {
        tokio::time::sleep(Duration::from_secs_f64(exposure)).await;
        if acquisition.halted() {
            break;
        }
        step += 1;
        current.set(step)?;
        let percent = step as f64 * 100.0 / total as f64;
        device
            .status()
            .progress(format!("Running in progress {:.0}% done", percent), percent)?;
        debug!("[{}] Frame {} of {}", device.name(), step, total);
    }
    Ok(step)
}

async fn run(device: Arc<Device>, acquisition: Arc<Acquisition>) -> Result<Option<Value>> {
    start(&device, &acquisition, "Starting run")?;
    let step = frames(device, acquisition).await?;
    Ok(Some(json!(step)))
}

async fn pause(device: Arc<Device>, acquisition: Arc<Acquisition>) -> Result<Option<Value>> {
    let status = device.status();
    acquisition.pause.store(true, Ordering::SeqCst);
    status.transition(&DState::Pausing, "Pausing started")?;
    acquisition.stopped().await?;
    status.transition(&DState::Paused, "Pausing finished")?;
    Ok(None)
}

async fn rewind(device: Arc<Device>, args: Args) -> Result<Option<Value>> {
    let steps = args.i64("steps")?;
    let current = attribute(&device, "currentStep")?;
    let step = current.value().as_i64().unwrap_or(0);
    if steps <= 0 {
        return Err(Error::InvalidArgs(format!("steps {} should be > 0", steps)));
    }
    if steps > step {
        return Err(Error::InvalidArgs(format!(
            "Cannot retrace {} steps as we are only on step {}",
            steps, step
        )));
    }

    let status = device.status();
    status.transition(&DState::Pausing, "Retracing started")?;
    current.set(step - steps)?;
    status.transition(&DState::Paused, "Pausing finished")?;
    Ok(None)
}

/// Restart the frame loop in the background and return once Running.
fn resume(device: Arc<Device>, acquisition: Arc<Acquisition>) -> Result<Option<Value>> {
    start(&device, &acquisition, "Resuming run")?;
    tokio::spawn(async move {
        let name = device.name().to_string();
        if let Err(e) = frames(device, acquisition).await {
            warn!("[{}] Resumed run failed: {}", name, e);
        }
    });
    Ok(None)
}

async fn abort(device: Arc<Device>, acquisition: Arc<Acquisition>) -> Result<Option<Value>> {
    let status = device.status();
    acquisition.abort.store(true, Ordering::SeqCst);
    status.transition(&DState::Aborting, "Aborting")?;
    acquisition.stopped().await?;
    status.transition(&DState::Aborted, "Aborted")?;
    Ok(None)
}

async fn reset(device: Arc<Device>) -> Result<Option<Value>> {
    let status = device.status();
    status.transition(&DState::Resetting, "Resetting...")?;
    status.transition(&DState::Idle, "Reset complete")?;
    Ok(None)
}

/// Build a dummy detector named `name`, starting in Idle.
pub fn dummy_det(name: &str) -> Result<Arc<Device>> {
    let acquisition = Acquisition::new();
    let for_run = acquisition.clone();
    let for_pause = acquisition.clone();
    let for_resume = acquisition.clone();
    let for_abort = acquisition;

    Device::builder(name, DState::states())
        .initial_state(&DState::Idle)
        .attribute(
            "single",
            Attribute::new(VType::Bool, "Whether to single step or not").with_value(false)?,
        )
        .attribute("nframes", Attribute::new(VType::Int, "Number of frames"))
        .attribute("exposure", Attribute::new(VType::Float, "Detector exposure"))
        .attribute(
            "configureSleep",
            Attribute::new(VType::Float, "Time to sleep to simulate configure"),
        )
        .attribute(
            "totalSteps",
            Attribute::new(VType::Int, "Readback of number of scan steps"),
        )
        .attribute(
            "currentStep",
            Attribute::new(VType::Int, "Readback of current scan step"),
        )
        .method(
            Method::builder("validate", |_device, args| async move {
                check_config(&args).map(Some)
            })
            .descriptor(
                "Check whether the configuration parameters are valid or not. \
                 No device state is taken into account.",
            )
            .arg("nframes")
            .arg("exposure")
            .arg_default("configureSleep", 0.0),
        )
        .method(
            Method::builder("configure", configure)
                .descriptor("Configure the detector")
                .valid_states(DState::configurable())
                .proxy_of("validate"),
        )
        .method(
            Method::builder("run", move |device, _args| run(device, for_run.clone()))
                .descriptor("Start a run")
                .valid_states([DState::Ready]),
        )
        .method(
            Method::builder("pause", move |device, _args| pause(device, for_pause.clone()))
                .descriptor("Pause a run so that it can be resumed later")
                .valid_states([DState::Running]),
        )
        .method(
            Method::builder("rewind", rewind)
                .descriptor("Retrace a number of steps in the current scan")
                .valid_states([DState::Paused])
                .typed_arg("steps", VType::Int, "Number of steps to rewind by", None),
        )
        .method(
            Method::builder("resume", move |device, _args| {
                let acquisition = for_resume.clone();
                async move { resume(device, acquisition) }
            })
            .descriptor("Resume the current scan")
            .valid_states([DState::Paused]),
        )
        .method(
            Method::builder("abort", move |device, _args| abort(device, for_abort.clone()))
                .descriptor("Abort the machine")
                .valid_states(DState::abortable()),
        )
        .method(
            Method::builder("reset", |device, _args| reset(device))
                .descriptor("Reset the underlying device")
                .valid_states([DState::Fault, DState::Aborted]),
        )
        .build()
}
