use heapless::Vec;

use crate::types::{
    MicChangeInfo, MicConnectParams, MicId, MicUser, MicUserState,
    MAX_CONCURRENT_MICS, MIC_USER_COUNT,
};

/// Static registration data for one microphone user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MicRegistryEntry {
    pub user: MicUser,
    /// Microphones kept connected whenever a non-interruptible user is
    /// active, so this user can later join without a reconnection glitch.
    pub mandatory_mics: Vec<MicId, MAX_CONCURRENT_MICS>,
    /// Longest AEC task period this user tolerates, 0 when it does not care.
    pub mandatory_task_period_us: u32,
}

impl MicRegistryEntry {
    pub fn new(user: MicUser) -> Self {
        Self { user, mandatory_mics: Vec::new(), mandatory_task_period_us: 0 }
    }

    pub fn with_mandatory_mic(mut self, mic: MicId) -> Self {
        if self.mandatory_mics.push(mic).is_err() {
            panic!("too many mandatory mics");
        }
        self
    }

    pub fn with_task_period_us(mut self, period_us: u32) -> Self {
        self.mandatory_task_period_us = period_us;
        self
    }
}

/// Callbacks into the microphone users, dispatched on [`MicUser`].
///
/// Only [`connection_params`](Self::connection_params) and
/// [`user_state`](Self::user_state) are mandatory; the indications default to
/// doing nothing for users that do not care.
pub trait MicUserClients {
    /// Microphones, sinks and rate `user` wants right now.
    fn connection_params(&mut self, user: MicUser) -> MicConnectParams;

    /// Current interruptibility of `user`.
    fn user_state(&self, user: MicUser) -> MicUserState;

    /// `user` is about to lose its microphones. Return `true` to be
    /// reconnected once the new configuration is in place.
    fn disconnect_indication(
        &mut self,
        _user: MicUser,
        _info: &MicChangeInfo,
    ) -> bool {
        false
    }

    /// The microphones of `user` were torn down and may be reconnected.
    fn ready_for_reconnection(&mut self, _user: MicUser, _info: &MicChangeInfo) {
    }

    /// `user` has been reconnected with the new configuration.
    fn reconnected(&mut self, _user: MicUser) {}

    /// Another user changed its interruptibility.
    fn user_state_updated(&mut self, _user: MicUser) {}

    /// Another user is about to connect or disconnect.
    fn change_pending(&mut self, _user: MicUser, _info: &MicChangeInfo) {}
}

pub(crate) struct MicRegistry {
    entries: Vec<MicRegistryEntry, MIC_USER_COUNT>,
}

impl MicRegistry {
    pub(crate) const fn new() -> Self {
        Self { entries: Vec::new() }
    }

    pub(crate) fn register(&mut self, entry: MicRegistryEntry) {
        if self.entries.iter().any(|e| e.user == entry.user) {
            panic!("mic user registered twice");
        }
        if self.entries.push(entry).is_err() {
            panic!("mic registry full");
        }
    }

    /// Panics for a user that never registered.
    pub(crate) fn entry(&self, user: MicUser) -> &MicRegistryEntry {
        match self.entries.iter().find(|e| e.user == user) {
            Some(e) => e,
            None => panic!("mic user not registered"),
        }
    }

    /// Registered users in registration order.
    pub(crate) fn users(&self) -> impl Iterator<Item = MicUser> + '_ {
        self.entries.iter().map(|e| e.user)
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = &MicRegistryEntry> + '_ {
        self.entries.iter()
    }

    pub(crate) fn clear(&mut self) {
        self.entries.clear();
    }
}
