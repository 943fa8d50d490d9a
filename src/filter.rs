//! # Event Filtering
//!
//! The predicate layer every watch event passes before reconciliation
//! does any work. Predicates compose by AND, in a fixed order:
//!
//! 1. content predicate: on Update, old and new fingerprints must differ;
//! 2. namespace deny-list, then allow-list (deny dominates);
//! 3. resource label selector;
//! 4. ignore annotation;
//! 5. lifecycle policy (create/update/delete/generic).
//!
//! The layer is pure: callers supply the event classification, the
//! fingerprints, and the `initialized` state, and get back either an
//! admit or the first reason the event was dropped (which feeds the
//! `skipped_total` metric).

use std::collections::BTreeMap;

use crate::config::Config;

/// Classification of a watch delivery for a single resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Create,
    Update,
    Delete,
    Generic,
}

impl EventKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::Create => "create",
            EventKind::Update => "update",
            EventKind::Delete => "delete",
            EventKind::Generic => "generic",
        }
    }
}

/// Metadata view of the resource an event concerns.
#[derive(Debug, Clone, Copy)]
pub struct EventMeta<'a> {
    pub namespace: &'a str,
    pub labels: &'a BTreeMap<String, String>,
    pub annotations: &'a BTreeMap<String, String>,
}

/// First predicate that dropped an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    ContentUnchanged,
    NamespaceIgnored,
    NamespaceNotAllowed,
    LabelSelectorMismatch,
    IgnoreAnnotation,
    NotInitialized,
    ReloadOnCreateDisabled,
    ReloadOnDeleteDisabled,
    GenericEvent,
}

impl DropReason {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            DropReason::ContentUnchanged => "content-unchanged",
            DropReason::NamespaceIgnored => "namespace-ignored",
            DropReason::NamespaceNotAllowed => "namespace-not-allowed",
            DropReason::LabelSelectorMismatch => "label-selector-mismatch",
            DropReason::IgnoreAnnotation => "ignore-annotation",
            DropReason::NotInitialized => "not-initialized",
            DropReason::ReloadOnCreateDisabled => "reload-on-create-disabled",
            DropReason::ReloadOnDeleteDisabled => "reload-on-delete-disabled",
            DropReason::GenericEvent => "generic-event",
        }
    }
}

/// Composed predicate set over the controller configuration.
#[derive(Debug)]
pub struct EventFilter<'a> {
    config: &'a Config,
}

impl<'a> EventFilter<'a> {
    #[must_use]
    pub fn new(config: &'a Config) -> Self {
        Self { config }
    }

    /// Evaluate every predicate; `Ok(())` admits the event.
    ///
    /// `old_hash`/`new_hash` are the content fingerprints before and after
    /// the event (absent on Create/Delete respectively); `initialized` is
    /// the reconciler's single-shot startup flag.
    pub fn evaluate(
        &self,
        kind: EventKind,
        meta: EventMeta<'_>,
        old_hash: Option<&str>,
        new_hash: Option<&str>,
        initialized: bool,
    ) -> Result<(), DropReason> {
        self.content_predicate(kind, old_hash, new_hash)?;
        self.namespace_predicate(meta.namespace)?;
        self.label_predicate(meta.labels)?;
        self.ignore_predicate(meta.annotations)?;
        self.lifecycle_predicate(kind, initialized)
    }

    /// On Update, admit only a real content change. Create and Delete are
    /// admitted unconditionally at this stage.
    fn content_predicate(
        &self,
        kind: EventKind,
        old_hash: Option<&str>,
        new_hash: Option<&str>,
    ) -> Result<(), DropReason> {
        if kind == EventKind::Update && old_hash == new_hash {
            return Err(DropReason::ContentUnchanged);
        }
        Ok(())
    }

    /// The ignore-list dominates; the allow-list is the optional watched
    /// namespace restriction.
    fn namespace_predicate(&self, namespace: &str) -> Result<(), DropReason> {
        if self.config.is_namespace_ignored(namespace) {
            return Err(DropReason::NamespaceIgnored);
        }
        if let Some(watched) = &self.config.watched_namespace {
            if namespace != watched {
                return Err(DropReason::NamespaceNotAllowed);
            }
        }
        Ok(())
    }

    fn label_predicate(&self, labels: &BTreeMap<String, String>) -> Result<(), DropReason> {
        if self.config.resource_selector.matches(labels) {
            Ok(())
        } else {
            Err(DropReason::LabelSelectorMismatch)
        }
    }

    fn ignore_predicate(
        &self,
        annotations: &BTreeMap<String, String>,
    ) -> Result<(), DropReason> {
        let ignored = annotations
            .get(&self.config.annotations.ignore)
            .is_some_and(|v| v == "true");
        if ignored {
            Err(DropReason::IgnoreAnnotation)
        } else {
            Ok(())
        }
    }

    fn lifecycle_predicate(&self, kind: EventKind, initialized: bool) -> Result<(), DropReason> {
        match kind {
            EventKind::Update => Ok(()),
            EventKind::Create if !initialized => {
                if self.config.sync_after_restart {
                    Ok(())
                } else {
                    Err(DropReason::NotInitialized)
                }
            }
            EventKind::Create => {
                if self.config.reload_on_create {
                    Ok(())
                } else {
                    Err(DropReason::ReloadOnCreateDisabled)
                }
            }
            EventKind::Delete => {
                if self.config.reload_on_delete {
                    Ok(())
                } else {
                    Err(DropReason::ReloadOnDeleteDisabled)
                }
            }
            EventKind::Generic => Err(DropReason::GenericEvent),
        }
    }
}
