// Copyright (c) 2023 - 2026 Restate Software, Inc., Restate GmbH.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use std::fmt;

use jiff::civil::DateTime;

use cosim_types::identifiers::SiteId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionStatus {
    /// The engine is being launched and connected.
    Initializing,
    /// Waiting for a control signal.
    Idle,
    /// A step is in flight.
    Running,
    /// No further step is performed, finalization is pending.
    Stopping,
    /// Finalized.
    Stopped,
    /// Setup or finalization failed.
    Failed,
}

impl SessionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionStatus::Stopped | SessionStatus::Failed)
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// State of one stepping session, owned by its driver.
#[derive(Debug)]
pub struct Session {
    site_id: SiteId,
    start: DateTime,
    end: DateTime,
    step: u64,
    status: SessionStatus,
    advance_requested: bool,
    master_enable_bypass: bool,
}

impl Session {
    pub fn new(site_id: SiteId, start: DateTime, end: DateTime, master_enable_bypass: bool) -> Self {
        Self {
            site_id,
            start,
            end,
            step: 1,
            status: SessionStatus::Initializing,
            advance_requested: false,
            master_enable_bypass,
        }
    }

    pub fn site_id(&self) -> &SiteId {
        &self.site_id
    }

    pub fn start(&self) -> DateTime {
        self.start
    }

    pub fn end(&self) -> DateTime {
        self.end
    }

    /// Index of the next step, starting at 1.
    pub fn step(&self) -> u64 {
        self.step
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn master_enable_bypass(&self) -> bool {
        self.master_enable_bypass
    }

    pub fn advance_requested(&self) -> bool {
        self.advance_requested
    }

    pub fn is_stepping(&self) -> bool {
        matches!(self.status, SessionStatus::Idle | SessionStatus::Running)
    }

    pub(crate) fn started(&mut self) {
        debug_assert!(matches!(self.status, SessionStatus::Initializing));
        self.status = SessionStatus::Idle;
    }

    /// Further requests before the step is performed are absorbed.
    pub(crate) fn request_advance(&mut self) {
        debug_assert!(matches!(self.status, SessionStatus::Idle));
        self.advance_requested = true;
    }

    pub(crate) fn begin_step(&mut self) {
        debug_assert!(matches!(self.status, SessionStatus::Idle));
        debug_assert!(self.advance_requested);
        self.status = SessionStatus::Running;
    }

    /// Returns the index of the next step.
    pub(crate) fn complete_step(&mut self) -> u64 {
        debug_assert!(matches!(self.status, SessionStatus::Running));
        self.step += 1;
        self.advance_requested = false;
        self.status = SessionStatus::Idle;
        self.step
    }

    pub(crate) fn stop(&mut self) {
        debug_assert!(self.is_stepping());
        self.advance_requested = false;
        self.status = SessionStatus::Stopping;
    }

    pub(crate) fn finalized(&mut self) {
        debug_assert!(matches!(self.status, SessionStatus::Stopping));
        self.status = SessionStatus::Stopped;
    }

    pub(crate) fn fail(&mut self) {
        debug_assert!(!self.status.is_terminal());
        self.status = SessionStatus::Failed;
    }
}
