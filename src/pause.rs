//! # Pause Bookkeeping
//!
//! Pure helpers behind the pause scheduler. A workload is
//! "paused by the controller" exactly when it carries the `paused-at`
//! annotation, which only this controller writes. The pause period comes
//! from the workload's `pause-period` annotation, falling back to the
//! configured default. Only kinds with a native `paused` spec field
//! participate (Deployment, Rollout, DeploymentConfig).

use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use tracing::warn;

use crate::config::{parse_duration, AnnotationSet};
use crate::workload::Workload;

/// Defined purely by presence of `paused-at`; operator-initiated pauses
/// (native `paused` without our stamp) are never touched.
#[must_use]
pub fn is_paused_by_reloader(workload: &Workload, keys: &AnnotationSet) -> bool {
    workload.annotations().contains_key(&keys.paused_at)
}

/// The pause period in effect for a workload, if any.
///
/// A malformed `pause-period` annotation is reported and disables
/// pausing for that workload; the configured default applies only when
/// the annotation is absent entirely.
#[must_use]
pub fn pause_period(
    workload: &Workload,
    keys: &AnnotationSet,
    default_period: Option<Duration>,
) -> Option<Duration> {
    match workload.annotations().get(&keys.pause_period) {
        Some(raw) => match parse_duration(raw) {
            Ok(period) => Some(period),
            Err(e) => {
                warn!(
                    "Ignoring malformed pause-period {:?} on {} {}/{}: {}",
                    raw,
                    workload.kind(),
                    workload.namespace(),
                    workload.name(),
                    e
                );
                None
            }
        },
        None => default_period,
    }
}

/// Attach pause state to a workload about to be reloaded: set the native
/// `paused` field and stamp `paused-at`. Returns whether anything was
/// added; workloads without a pause period, without a native pause field,
/// or already paused by the controller are left alone.
pub fn attach_pause(
    workload: &mut Workload,
    keys: &AnnotationSet,
    default_period: Option<Duration>,
) -> bool {
    if !workload.supports_pause() {
        return false;
    }
    if pause_period(workload, keys, default_period).is_none() {
        return false;
    }
    if is_paused_by_reloader(workload, keys) {
        return false;
    }

    workload.set_paused(true);
    let now = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);
    workload
        .annotations_mut()
        .insert(keys.paused_at.clone(), now);
    true
}

/// Remaining pause time for a paused-by-controller workload.
///
/// `None` means the pause has expired (or the stamp is unreadable) and
/// the workload should be unpaused now.
#[must_use]
pub fn remaining_pause(
    workload: &Workload,
    keys: &AnnotationSet,
    default_period: Option<Duration>,
    now: DateTime<Utc>,
) -> Option<Duration> {
    let stamped = workload.annotations().get(&keys.paused_at)?;
    let paused_at = match DateTime::parse_from_rfc3339(stamped) {
        Ok(t) => t.with_timezone(&Utc),
        Err(e) => {
            warn!(
                "Unreadable paused-at {:?} on {} {}/{}: {}; unpausing",
                stamped,
                workload.kind(),
                workload.namespace(),
                workload.name(),
                e
            );
            return None;
        }
    };
    let period = pause_period(workload, keys, default_period)?;
    let expires_at = paused_at + chrono::Duration::from_std(period).ok()?;
    let remaining = expires_at - now;
    remaining.to_std().ok().filter(|d| !d.is_zero())
}

/// Clear the controller-applied pause: native `paused` off, stamp removed.
pub fn clear_pause(workload: &mut Workload, keys: &AnnotationSet) -> bool {
    if !is_paused_by_reloader(workload, keys) {
        return false;
    }
    workload.set_paused(false);
    workload.annotations_mut().remove(&keys.paused_at);
    true
}
