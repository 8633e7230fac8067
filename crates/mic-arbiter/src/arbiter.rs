use heapless::Vec;

use crate::aec_map::{aec_use_case, aec_user_config, AecUseCase};
use crate::error::MicError;
use crate::ordered::OrderedMicList;
use crate::platform::{
    AecAudioConfig, AecAudioInput, AecMicRoute, AecReference, MicHardware,
    MicPlatform, MicResampler, SplitterChain,
};
use crate::registry::{MicRegistry, MicRegistryEntry, MicUserClients};
use crate::types::{
    MicChangeInfo, MicConnectParams, MicEvent, MicId, MicUser, MicUserState,
    MicUsers, Sink, Source, DEFAULT_TASK_PERIOD_US, MAX_CONCURRENT_MICS,
    MAX_CONCURRENT_MIC_USERS, MAX_SUPPORTED_MICROPHONES, MIC_USER_COUNT,
    MIN_SAMPLE_RATE_HZ,
};

const MIC_SLOTS: usize = MAX_SUPPORTED_MICROPHONES as usize + 1;
const SPLITTER_CHANNELS: usize = 1 + MAX_CONCURRENT_MICS;
const NO_LIST: Option<OrderedMicList> = None;

type UserList = Vec<MicUser, MIC_USER_COUNT>;

#[derive(Debug, Clone, Copy)]
struct StreamSlot {
    user: MicUser,
    resampled: bool,
}

/// Shares the physical microphones and the AEC reference between users.
///
/// Users connect through a splitter fan-out that is created on demand. A
/// request that the running configuration cannot serve (extra mic, higher
/// rate, shorter task period, AEC use-case change) tears everything down and
/// rebuilds it, unless an active user is non-interruptible, in which case the
/// request is rejected and the caller retries later.
///
/// Every user is recorded with the combined mic list it was turned on with,
/// and exactly that list is released when it leaves, so per-mic use counts
/// always equal the number of holders.
pub struct MicArbiter {
    registry: MicRegistry,
    concurrency_enabled: bool,
    splitter_created: bool,
    mic_sample_rate: u32,
    current_users: MicUsers,
    streams: [Option<StreamSlot>; MAX_CONCURRENT_MIC_USERS],
    held: [Option<OrderedMicList>; MIC_USER_COUNT],
    wake_states: MicUsers,
    chains_awake: bool,
    leakthrough_enabled: bool,
    sources: [Option<Source>; MIC_SLOTS],
    use_count: [u8; MIC_SLOTS],
}

impl Default for MicArbiter {
    fn default() -> Self {
        Self::new()
    }
}

impl MicArbiter {
    pub const fn new() -> Self {
        Self {
            registry: MicRegistry::new(),
            concurrency_enabled: false,
            splitter_created: false,
            mic_sample_rate: 0,
            current_users: MicUsers::empty(),
            streams: [None; MAX_CONCURRENT_MIC_USERS],
            held: [NO_LIST; MIC_USER_COUNT],
            wake_states: MicUsers::all(),
            chains_awake: true,
            leakthrough_enabled: false,
            sources: [None; MIC_SLOTS],
            use_count: [0; MIC_SLOTS],
        }
    }

    pub fn register_user(&mut self, entry: MicRegistryEntry) {
        debug!("mic register {:?}", entry.user);
        self.registry.register(entry);
    }

    /// Concurrency needs the mic resampler chain; without it only one user
    /// may hold the microphones at a time.
    pub fn set_concurrency_enabled(&mut self, enabled: bool) {
        self.concurrency_enabled = enabled;
    }

    pub fn is_concurrency_enabled(&self) -> bool {
        self.concurrency_enabled
    }

    pub fn active_users(&self) -> MicUsers {
        self.current_users
    }

    pub fn use_count(&self, mic: MicId) -> u8 {
        self.use_count[mic.index()]
    }

    /// The mic list `user` was turned on with, while it is connected.
    pub fn held_mics(&self, user: MicUser) -> Option<&OrderedMicList> {
        self.held[user.index()].as_ref()
    }

    pub fn is_leakthrough_enabled(&self) -> bool {
        self.leakthrough_enabled
    }

    pub fn mic_sample_rate(&self) -> u32 {
        self.mic_sample_rate
    }

    pub fn is_splitter_created(&self) -> bool {
        self.splitter_created
    }

    pub fn are_chains_awake(&self) -> bool {
        self.chains_awake
    }

    /// Splitter output stream serving `user`.
    pub fn stream_of(&self, user: MicUser) -> Option<usize> {
        self.streams
            .iter()
            .position(|s| matches!(s, Some(slot) if slot.user == user))
    }

    /// Forget all users and wiring. Registrations are dropped too.
    pub fn clear_state(&mut self) {
        let concurrency_enabled = self.concurrency_enabled;
        *self = Self::new();
        self.concurrency_enabled = concurrency_enabled;
    }

    /// Request `user`'s microphones.
    pub fn connect<P, C>(
        &mut self,
        hw: &mut P,
        clients: &mut C,
        user: MicUser,
    ) -> Result<(), MicError>
    where
        P: MicPlatform,
        C: MicUserClients,
    {
        self.wake_chains(hw);
        debug!("mic connect {:?}", user);
        let result = self.try_connect(hw, clients, user);
        if result.is_err() {
            info!("mic connect {:?} rejected, try again later", user);
        }
        self.sleep_chains(hw);
        result
    }

    /// Release `user`'s microphones.
    pub fn disconnect<P, C>(&mut self, hw: &mut P, clients: &mut C, user: MicUser)
    where
        P: MicPlatform,
        C: MicUserClients,
    {
        if self.is_attached_leakthrough(user) {
            self.detach_leakthrough(hw, clients);
            return;
        }
        self.wake_chains(hw);
        debug!("mic disconnect {:?}", user);
        if !self.is_current(user) {
            warn!("mic disconnect from {:?} which is not connected", user);
        } else if !self.concurrency_enabled {
            self.disconnect_legacy_user(hw, user);
        } else {
            self.disconnect_user(hw, clients, user);
        }
        self.sleep_chains(hw);
    }

    /// Attach the leakthrough path straight to the AEC mic path.
    pub fn attach_leakthrough<P, C>(
        &mut self,
        hw: &mut P,
        clients: &mut C,
    ) -> Result<(), MicError>
    where
        P: MicPlatform,
        C: MicUserClients,
    {
        if self.leakthrough_enabled || self.is_current(MicUser::Leakthrough) {
            debug!("leakthrough already attached");
            return Ok(());
        }
        self.wake_chains(hw);
        let result = self.try_attach_leakthrough(hw, clients);
        if result.is_err() {
            info!("leakthrough attach rejected, try again later");
        }
        self.sleep_chains(hw);
        result
    }

    pub fn detach_leakthrough<P, C>(&mut self, hw: &mut P, clients: &mut C)
    where
        P: MicPlatform,
        C: MicUserClients,
    {
        if !self.leakthrough_enabled {
            debug!("leakthrough already detached");
            return;
        }
        self.wake_chains(hw);
        let user = MicUser::Leakthrough;
        let mut info = MicChangeInfo { user, event: MicEvent::DISCONNECTING };
        let reconnect = match self.prepare_for_disconnection(clients, user, &mut info)
        {
            Some(reconnect) => {
                let inform = self.current_users;
                self.disconnect_all_users(hw);
                self.inform_ready_for_reconnection(clients, user, inform, &info);
                reconnect
            }
            None => {
                debug!("leakthrough detaches, mics stay");
                self.current_users.remove(MicUsers::LEAKTHROUGH);
                self.release_held_mics(hw, user);
                MicUsers::empty()
            }
        };
        self.leakthrough_enabled = false;
        self.reconnect_all_users(hw, clients, None, reconnect);
        self.send_reconnected(clients, reconnect);
        self.apply_aec_use_case(hw);
        self.sleep_chains(hw);
    }

    /// `user` no longer needs the chains awake. Once every active user has
    /// said so the whole front-end is suspended.
    pub fn sleep<P: MicPlatform>(&mut self, hw: &mut P, user: MicUser) {
        self.wake_states.remove(user.into());
        self.sleep_chains(hw);
    }

    pub fn wake<P: MicPlatform>(&mut self, hw: &mut P, user: MicUser) {
        if self.is_current(user) {
            self.wake_states.insert(user.into());
            self.wake_chains(hw);
        }
    }

    /// Tell every other active user that `user` changed its state.
    pub fn user_updated_state<C: MicUserClients>(
        &self,
        clients: &mut C,
        user: MicUser,
    ) {
        for u in self.registry.users() {
            if self.is_current(u) && u != user {
                clients.user_state_updated(u);
            }
        }
    }

    // ------------------------------------------------------------------
    // Connection
    // ------------------------------------------------------------------

    fn try_connect<P, C>(
        &mut self,
        hw: &mut P,
        clients: &mut C,
        user: MicUser,
    ) -> Result<(), MicError>
    where
        P: MicPlatform,
        C: MicUserClients,
    {
        // Unregistered users are a configuration defect.
        let _ = self.registry.entry(user);
        if self.is_current(user) {
            warn!("mic user {:?} already connected", user);
            return Ok(());
        }
        if self.splitter_users().bits().count_ones() as usize
            >= MAX_CONCURRENT_MIC_USERS
        {
            debug!("maximum mic users already connected");
            return Err(MicError::TooManyUsers);
        }
        let params = clients.connection_params(user);
        assert!(!params.connections.is_empty(), "mic user requested no mics");

        let reconnect =
            self.prepare_for_connection(hw, clients, user, &params, false)?;
        self.connect_user_to_mics(hw, clients, user, &params, reconnect);
        Ok(())
    }

    fn try_attach_leakthrough<P, C>(
        &mut self,
        hw: &mut P,
        clients: &mut C,
    ) -> Result<(), MicError>
    where
        P: MicPlatform,
        C: MicUserClients,
    {
        let user = MicUser::Leakthrough;
        let params = clients.connection_params(user);
        assert!(!params.connections.is_empty(), "leakthrough requested no mics");

        let reconnect =
            self.prepare_for_connection(hw, clients, user, &params, true)?;

        let mut combined = OrderedMicList::from_connections(&params.connections);
        let mut rate = params.sample_rate.max(MIN_SAMPLE_RATE_HZ);
        if !self.current_users.is_empty() {
            self.collect_mics(clients, self.current_users, &mut combined, &mut rate);
        }
        if !reconnect.is_empty() {
            self.collect_mics(clients, reconnect, &mut combined, &mut rate);
        }
        if self.any_user_in_state(clients, MicUserState::NonInterruptible, None) {
            self.add_mandatory_mics(&mut combined);
        }

        self.leakthrough_enabled = true;
        self.connect_leakthrough(hw, &combined, rate);
        hw.setup_leakthrough_gain();
        self.reconnect_all_users(hw, clients, Some(user), reconnect);
        self.send_reconnected(clients, reconnect);
        Ok(())
    }

    /// Decide whether `new_user` can join. On success returns the users that
    /// asked to be reconnected after a teardown (empty when joining directly).
    fn prepare_for_connection<P, C>(
        &mut self,
        hw: &mut P,
        clients: &mut C,
        new_user: MicUser,
        params: &MicConnectParams,
        check_use_case: bool,
    ) -> Result<MicUsers, MicError>
    where
        P: MicPlatform,
        C: MicUserClients,
    {
        if self.current_users.is_empty() {
            return Ok(MicUsers::empty());
        }
        if !self.concurrency_enabled {
            return Err(MicError::ConcurrencyDisabled);
        }

        // Mics can only be synchronised and wired to the AEC once, so every
        // requested mic must already run, at a rate at least as high.
        let mut event = MicEvent::CONNECTING;
        if check_use_case && hw.aec().use_case() < AecUseCase::EnableLeakthrough
        {
            event |= MicEvent::UCID_CHANGE_REQUIRED;
        }
        if self.task_period_change_required(hw, new_user) {
            event |= MicEvent::TASK_PERIOD_CHANGE_REQUIRED;
        }
        if self.mic_sample_rate < params.sample_rate {
            event |= MicEvent::HIGHER_SAMPLE_RATE;
        }
        if !self.are_mics_in_use(params.connections.iter().map(|c| c.mic)) {
            event |= MicEvent::EXTRA_MIC;
        }

        let mut info = MicChangeInfo { user: new_user, event };
        self.notify_change_pending(clients, new_user, &info);

        let blocked = self.any_user_in_state(
            clients,
            MicUserState::NonInterruptible,
            Some(new_user),
        );
        // An always-interrupt user is cycled even without a conflict.
        if event == MicEvent::CONNECTING
            && !self.any_user_in_state(
                clients,
                MicUserState::AlwaysInterrupt,
                Some(new_user),
            )
        {
            return Ok(MicUsers::empty());
        }
        if blocked {
            debug!("mic conflict for {:?}, event {:?}", new_user, event);
            return Err(MicError::NonInterruptibleUser);
        }

        debug!("mic reconfiguration for {:?}, event {:?}", new_user, event);
        let reconnect =
            self.inform_users_about_disconnection(clients, new_user, &mut info);
        let inform = self.current_users;
        self.disconnect_all_users(hw);
        self.settle_leakthrough(reconnect);
        self.inform_ready_for_reconnection(clients, new_user, inform, &info);
        Ok(reconnect)
    }

    fn connect_user_to_mics<P, C>(
        &mut self,
        hw: &mut P,
        clients: &mut C,
        user: MicUser,
        params: &MicConnectParams,
        reconnect: MicUsers,
    ) where
        P: MicPlatform,
        C: MicUserClients,
    {
        if self.concurrency_enabled {
            let (combined, rate) =
                self.populate_mic_sources(hw, clients, user, params, reconnect);
            let sources = self.turn_on_mics(hw, &combined, rate);
            self.held[user.index()] = Some(combined.clone());

            // New user first, then whoever asked to come back.
            self.add_mic_user(hw, user);
            self.connect_user_via_concurrency_chain(
                hw,
                user,
                &combined,
                &sources,
                params.sample_rate,
                params.aec_ref_sink,
            );
            self.reconnect_all_users(hw, clients, Some(user), reconnect);
            self.send_reconnected(clients, reconnect);
        } else {
            debug!("mic concurrency disabled, connecting {:?} directly", user);
            let list = OrderedMicList::from_connections(&params.connections);
            let sources = self.turn_on_mics(hw, &list, params.sample_rate);
            self.held[user.index()] = Some(list.clone());
            self.current_users.insert(user.into());
            self.connect_user_directly_to_aec(
                hw,
                &list,
                &sources,
                params.aec_ref_sink,
            );
        }
    }

    /// Combined mic list and rate for a connecting user: its own mics with
    /// sinks, everyone else's without, plus mandatory mics when a
    /// non-interruptible user is involved. Also programs the AEC task period.
    fn populate_mic_sources<P, C>(
        &self,
        hw: &mut P,
        clients: &mut C,
        user: MicUser,
        params: &MicConnectParams,
        reconnect: MicUsers,
    ) -> (OrderedMicList, u32)
    where
        P: MicPlatform,
        C: MicUserClients,
    {
        let mut list = OrderedMicList::from_connections(&params.connections);
        let mut rate = params.sample_rate.max(MIN_SAMPLE_RATE_HZ);
        if !self.current_users.is_empty() {
            self.collect_mics(clients, self.current_users, &mut list, &mut rate);
        }
        if !reconnect.is_empty() {
            self.collect_mics(clients, reconnect, &mut list, &mut rate);
        }

        let period = if self.any_user_in_state(
            clients,
            MicUserState::NonInterruptible,
            None,
        ) || clients.user_state(user) == MicUserState::NonInterruptible
        {
            self.add_mandatory_mics(&mut list);
            self.min_task_period(None)
        } else {
            self.min_task_period(Some(reconnect | MicUsers::from(user)))
        };
        hw.aec().set_task_period_us(period);
        (list, rate)
    }

    fn reconnect_all_users<P, C>(
        &mut self,
        hw: &mut P,
        clients: &mut C,
        new_user: Option<MicUser>,
        reconnect: MicUsers,
    ) where
        P: MicPlatform,
        C: MicUserClients,
    {
        if reconnect.is_empty() {
            return;
        }
        let base = new_user.map_or(MicUsers::empty(), MicUsers::from);
        for user in self.registered_users() {
            if !reconnect.has(user) {
                continue;
            }
            debug!("mic reconnect {:?}", user);
            let params = clients.connection_params(user);
            let mut combined =
                OrderedMicList::from_connections(&params.connections);
            let mut rate = 0;
            self.collect_mics(clients, reconnect | base, &mut combined, &mut rate);

            let period = if self.any_user_in_state(
                clients,
                MicUserState::NonInterruptible,
                None,
            ) {
                self.add_mandatory_mics(&mut combined);
                self.min_task_period(None)
            } else {
                self.min_task_period(Some(reconnect | base))
            };
            hw.aec().set_task_period_us(period);

            if self.is_attached_leakthrough(user) {
                self.connect_leakthrough(hw, &combined, rate);
            } else {
                let sources = self.turn_on_mics(hw, &combined, rate);
                self.held[user.index()] = Some(combined.clone());
                self.add_mic_user(hw, user);
                self.connect_user_via_concurrency_chain(
                    hw,
                    user,
                    &combined,
                    &sources,
                    params.sample_rate,
                    params.aec_ref_sink,
                );
            }
        }
        hw.setup_leakthrough_gain();
    }

    fn connect_leakthrough<P: MicPlatform>(
        &mut self,
        hw: &mut P,
        combined: &OrderedMicList,
        rate: u32,
    ) {
        let sources = self.turn_on_mics(hw, combined, rate);
        self.held[MicUser::Leakthrough.index()] = Some(combined.clone());
        if self.current_users.is_empty() {
            let config = self.aec_config();
            hw.aec().connect_mic_path_input(&sources, &config);
        }
        self.current_users.insert(MicUsers::LEAKTHROUGH);
        self.apply_aec_use_case(hw);
    }

    // ------------------------------------------------------------------
    // Disconnection
    // ------------------------------------------------------------------

    fn disconnect_user<P, C>(&mut self, hw: &mut P, clients: &mut C, user: MicUser)
    where
        P: MicPlatform,
        C: MicUserClients,
    {
        let mut info = MicChangeInfo { user, event: MicEvent::DISCONNECTING };
        let reconnect = match self.prepare_for_disconnection(clients, user, &mut info)
        {
            Some(reconnect) => {
                let inform = self.current_users;
                self.disconnect_all_users(hw);
                self.settle_leakthrough(reconnect);
                self.inform_ready_for_reconnection(clients, user, inform, &info);
                reconnect
            }
            None => {
                // AEC wiring is untouched, so no resynchronisation either.
                debug!("mic user {:?} disconnects, mics stay", user);
                self.disconnect_user_from_concurrency_chain(hw, user);
                self.remove_mic_user(hw, user);
                self.release_held_mics(hw, user);
                MicUsers::empty()
            }
        };
        self.reconnect_all_users(hw, clients, None, reconnect);
        self.send_reconnected(clients, reconnect);
    }

    fn disconnect_legacy_user<P: MicPlatform>(&mut self, hw: &mut P, user: MicUser) {
        let sources = self.held_sources(user);
        self.release_held_mics(hw, user);
        self.current_users.remove(user.into());
        hw.aec().disconnect_audio_input();
        self.unsynchronise_mics(hw, &sources);
    }

    /// `Some(reconnect)` when the whole front-end may be torn down,
    /// `None` when a remaining non-interruptible user pins it.
    fn prepare_for_disconnection<C: MicUserClients>(
        &self,
        clients: &mut C,
        user: MicUser,
        info: &mut MicChangeInfo,
    ) -> Option<MicUsers> {
        if self.current_users == MicUsers::from(user) {
            return Some(MicUsers::empty());
        }
        self.notify_change_pending(clients, user, info);
        if self.any_user_in_state(
            clients,
            MicUserState::NonInterruptible,
            Some(user),
        ) {
            return None;
        }
        Some(self.inform_users_about_disconnection(clients, user, info))
    }

    fn disconnect_all_users<P: MicPlatform>(&mut self, hw: &mut P) {
        let mut last_sources: Vec<Source, MAX_CONCURRENT_MICS> = Vec::new();
        for user in self.registered_users() {
            if !self.is_current(user) {
                continue;
            }
            debug!("mic disconnect all: {:?}", user);
            if self.is_attached_leakthrough(user) {
                self.current_users.remove(MicUsers::LEAKTHROUGH);
                self.apply_aec_use_case(hw);
            } else {
                self.disconnect_user_from_concurrency_chain(hw, user);
                self.remove_mic_user(hw, user);
            }
            let sources = self.held_sources(user);
            if !sources.is_empty() {
                last_sources = sources;
            }
            self.release_held_mics(hw, user);
        }
        hw.aec().disconnect_audio_input();
        self.unsynchronise_mics(hw, &last_sources);
    }

    fn disconnect_user_from_concurrency_chain<P: MicPlatform>(
        &mut self,
        hw: &mut P,
        user: MicUser,
    ) {
        let stream = self.stream_index(user);
        let resampled = self.streams[stream].is_some_and(|s| s.resampled);
        if resampled {
            hw.resampler().stop(stream);
        }
        hw.splitter().disconnect_output_stream(stream);
        if resampled {
            hw.resampler().destroy(stream);
            self.set_resampled(stream, false);
        }
        if self.splitter_users() == MicUsers::from(user) {
            hw.splitter().destroy();
            self.splitter_created = false;
        }
    }

    /// Drop the leakthrough flag when the attached leakthrough user was torn
    /// down and did not ask to come back.
    fn settle_leakthrough(&mut self, reconnect: MicUsers) {
        if self.leakthrough_enabled
            && !self.current_users.has(MicUser::Leakthrough)
            && !reconnect.has(MicUser::Leakthrough)
        {
            self.leakthrough_enabled = false;
        }
    }

    // ------------------------------------------------------------------
    // User notifications
    // ------------------------------------------------------------------

    fn inform_users_about_disconnection<C: MicUserClients>(
        &self,
        clients: &mut C,
        user: MicUser,
        info: &mut MicChangeInfo,
    ) -> MicUsers {
        let mut reconnect = MicUsers::empty();
        for current in self.registry.users() {
            if !self.is_current(current) || current == user {
                continue;
            }
            if clients.disconnect_indication(current, info) {
                reconnect.insert(current.into());
            } else {
                info.user = current;
                info.event = MicEvent::DISCONNECTING;
                self.notify_change_pending(clients, current, info);
            }
        }
        reconnect
    }

    fn inform_ready_for_reconnection<C: MicUserClients>(
        &self,
        clients: &mut C,
        new_user: MicUser,
        users: MicUsers,
        info: &MicChangeInfo,
    ) {
        for user in self.registry.users() {
            if users.has(user) && user != new_user {
                clients.ready_for_reconnection(user, info);
            }
        }
    }

    fn notify_change_pending<C: MicUserClients>(
        &self,
        clients: &mut C,
        except: MicUser,
        info: &MicChangeInfo,
    ) {
        for user in self.registry.users() {
            if self.is_current(user) && user != except {
                clients.change_pending(user, info);
            }
        }
    }

    fn send_reconnected<C: MicUserClients>(&self, clients: &mut C, users: MicUsers) {
        if !self.concurrency_enabled || users.is_empty() {
            return;
        }
        for user in self.registry.users() {
            if users.has(user) {
                clients.reconnected(user);
            }
        }
    }

    fn any_user_in_state<C: MicUserClients>(
        &self,
        clients: &C,
        state: MicUserState,
        exclude: Option<MicUser>,
    ) -> bool {
        self.registry.users().any(|user| {
            self.is_current(user)
                && Some(user) != exclude
                && clients.user_state(user) == state
        })
    }

    // ------------------------------------------------------------------
    // Mic lists and requirements
    // ------------------------------------------------------------------

    /// Merge the mics of `users` (without sinks) and raise `rate` to their
    /// highest floored rate.
    fn collect_mics<C: MicUserClients>(
        &self,
        clients: &mut C,
        users: MicUsers,
        list: &mut OrderedMicList,
        rate: &mut u32,
    ) {
        for user in self.registry.users() {
            if !users.has(user) {
                continue;
            }
            let params = clients.connection_params(user);
            *rate = (*rate).max(params.sample_rate.max(MIN_SAMPLE_RATE_HZ));
            list.merge_ids(params.connections.iter().map(|c| c.mic));
        }
    }

    fn add_mandatory_mics(&self, list: &mut OrderedMicList) {
        for entry in self.registry.iter() {
            list.merge_ids(entry.mandatory_mics.iter().copied());
        }
    }

    /// Shortest non-zero mandatory task period among `users`, or among every
    /// registered user for `None`.
    fn min_task_period(&self, users: Option<MicUsers>) -> u32 {
        self.registry
            .iter()
            .filter(|e| users.map_or(true, |u| u.has(e.user)))
            .map(|e| e.mandatory_task_period_us)
            .filter(|p| *p > 0)
            .fold(DEFAULT_TASK_PERIOD_US, u32::min)
    }

    fn task_period_change_required<P: MicPlatform>(
        &self,
        hw: &mut P,
        user: MicUser,
    ) -> bool {
        if !hw.aec().is_mic_path_input_connected() {
            return false;
        }
        let period = self.registry.entry(user).mandatory_task_period_us;
        period > 0 && hw.aec().task_period_us() > period
    }

    fn are_mics_in_use(&self, mut ids: impl Iterator<Item = MicId>) -> bool {
        ids.all(|id| self.use_count[id.index()] > 0)
    }

    // ------------------------------------------------------------------
    // Physical mics
    // ------------------------------------------------------------------

    fn turn_on_mics<P: MicPlatform>(
        &mut self,
        hw: &mut P,
        list: &OrderedMicList,
        rate: u32,
    ) -> Vec<Source, MAX_CONCURRENT_MICS> {
        let create = !self.are_mics_in_use(list.ids());
        if create || self.mic_sample_rate < MIN_SAMPLE_RATE_HZ {
            self.mic_sample_rate = rate;
        }

        let mut sources = Vec::new();
        for id in list.ids() {
            let source = hw.mics().turn_on(id, self.mic_sample_rate);
            self.sources[id.index()] = Some(source);
            self.use_count[id.index()] += 1;
            let _ = sources.push(source);
        }

        // Mics are synchronised once, by whoever turns them on first.
        if self.splitter_users().is_empty() {
            self.unsynchronise_mics(hw, &sources);
            for pair in sources.windows(2) {
                hw.mics().synchronise(pair[0], Some(pair[1]));
            }
        }
        sources
    }

    fn release_held_mics<P: MicPlatform>(&mut self, hw: &mut P, user: MicUser) {
        let Some(list) = self.held[user.index()].take() else {
            return;
        };
        for id in list.ids() {
            let slot = id.index();
            assert!(self.use_count[slot] > 0, "mic use count underflow");
            self.use_count[slot] -= 1;
            hw.mics().turn_off(id);
            if self.use_count[slot] == 0 {
                self.sources[slot] = None;
            }
        }
    }

    fn unsynchronise_mics<P: MicPlatform>(&self, hw: &mut P, sources: &[Source]) {
        if self.splitter_users().is_empty() {
            for source in sources {
                hw.mics().synchronise(*source, None);
            }
        }
    }

    fn held_sources(&self, user: MicUser) -> Vec<Source, MAX_CONCURRENT_MICS> {
        self.held[user.index()]
            .iter()
            .flat_map(|list| list.ids())
            .filter_map(|id| self.sources[id.index()])
            .collect()
    }

    fn live_sources(&self) -> Vec<Source, { MAX_SUPPORTED_MICROPHONES as usize }> {
        (1..MIC_SLOTS)
            .filter(|slot| self.use_count[*slot] > 0)
            .filter_map(|slot| self.sources[slot])
            .collect()
    }

    // ------------------------------------------------------------------
    // AEC and splitter wiring
    // ------------------------------------------------------------------

    fn connect_user_directly_to_aec<P: MicPlatform>(
        &self,
        hw: &mut P,
        list: &OrderedMicList,
        sources: &[Source],
        aec_ref_sink: Option<Sink>,
    ) {
        let input = AecAudioInput {
            reference_output: aec_ref_sink,
            mics: list
                .iter()
                .zip(sources)
                .map(|(mic, source)| AecMicRoute { input: *source, output: mic.sink })
                .collect(),
        };
        let config = self.aec_config();
        hw.aec().connect_audio_input(&input, &config);
    }

    fn connect_user_via_concurrency_chain<P: MicPlatform>(
        &mut self,
        hw: &mut P,
        user: MicUser,
        combined: &OrderedMicList,
        sources: &[Source],
        user_rate: u32,
        aec_ref_sink: Option<Sink>,
    ) {
        let stream = self.stream_index(user);
        if !self.splitter_created {
            hw.splitter().create(MAX_CONCURRENT_MIC_USERS, 1 + combined.len());
            self.splitter_created = true;
            self.connect_splitter_chain_to_aec(hw, sources);
        }
        self.connect_user_to_concurrency_chain(
            hw,
            stream,
            combined,
            user_rate,
            aec_ref_sink,
        );
        hw.splitter().start_output_stream(stream);
    }

    fn connect_splitter_chain_to_aec<P: MicPlatform>(
        &self,
        hw: &mut P,
        sources: &[Source],
    ) {
        let aec_sink = hw.splitter().input(0);
        let mut mic_sinks: Vec<Sink, MAX_CONCURRENT_MICS> = Vec::new();
        for channel in 1..=sources.len() {
            let _ = mic_sinks.push(hw.splitter().input(channel));
        }

        if hw.aec().is_mic_path_input_connected() {
            hw.aec().connect_mic_path_output(aec_sink, &mic_sinks);
        } else {
            let input = AecAudioInput {
                reference_output: Some(aec_sink),
                mics: sources
                    .iter()
                    .zip(mic_sinks.iter())
                    .map(|(source, sink)| AecMicRoute {
                        input: *source,
                        output: Some(*sink),
                    })
                    .collect(),
            };
            let config = self.aec_config();
            hw.aec().connect_audio_input(&input, &config);
        }
    }

    /// Route one splitter output stream to a user's sinks, through a
    /// resampler when the user runs at a different rate than the mics.
    fn connect_user_to_concurrency_chain<P: MicPlatform>(
        &mut self,
        hw: &mut P,
        stream: usize,
        combined: &OrderedMicList,
        user_rate: u32,
        mut aec_ref_sink: Option<Sink>,
    ) {
        let use_resampler = user_rate != self.mic_sample_rate;
        let mut sinks: Vec<Option<Sink>, SPLITTER_CHANNELS> = Vec::new();
        let _ = sinks.push(None);
        for mic in combined.iter() {
            let _ = sinks.push(mic.sink);
        }

        if use_resampler {
            hw.resampler().create(stream, self.mic_sample_rate, user_rate);
            self.set_resampled(stream, true);
            if let Some(sink) = aec_ref_sink {
                let output = hw.resampler().aec_output(stream);
                hw.connect(output, sink);
                aec_ref_sink = Some(hw.resampler().aec_input(stream));
            }
            for (channel, mic) in combined.iter().enumerate() {
                if let Some(sink) = mic.sink {
                    let output = hw.resampler().mic_output(stream, channel);
                    hw.connect(output, sink);
                    sinks[channel + 1] = Some(hw.resampler().mic_input(stream, channel));
                }
            }
        }
        sinks[0] = aec_ref_sink;

        hw.splitter().connect_output_stream(stream, &sinks);
        if use_resampler {
            hw.resampler().start(stream);
        }
    }

    fn aec_config(&self) -> AecAudioConfig {
        match aec_user_config(self.current_users, self.leakthrough_enabled) {
            Some(config) => config.audio_config(self.mic_sample_rate),
            None => AecAudioConfig {
                mic_sample_rate: self.mic_sample_rate,
                ..Default::default()
            },
        }
    }

    fn apply_aec_use_case<P: MicPlatform>(&self, hw: &mut P) {
        let use_case = aec_use_case(self.current_users, self.leakthrough_enabled);
        hw.aec().set_use_case(use_case);
    }

    // ------------------------------------------------------------------
    // Users and streams
    // ------------------------------------------------------------------

    fn is_current(&self, user: MicUser) -> bool {
        self.current_users.has(user)
    }

    fn is_attached_leakthrough(&self, user: MicUser) -> bool {
        user == MicUser::Leakthrough && self.leakthrough_enabled
    }

    /// Active users fed through the splitter, i.e. all but an attached
    /// leakthrough.
    fn splitter_users(&self) -> MicUsers {
        if self.leakthrough_enabled {
            self.current_users.difference(MicUsers::LEAKTHROUGH)
        } else {
            self.current_users
        }
    }

    fn registered_users(&self) -> UserList {
        self.registry.users().collect()
    }

    fn add_mic_user<P: MicPlatform>(&mut self, hw: &mut P, user: MicUser) {
        if self.is_current(user) {
            return;
        }
        self.current_users.insert(user.into());
        self.apply_aec_use_case(hw);
        match self.streams.iter_mut().find(|s| s.is_none()) {
            Some(slot) => *slot = Some(StreamSlot { user, resampled: false }),
            None => panic!("no free splitter stream"),
        }
    }

    fn remove_mic_user<P: MicPlatform>(&mut self, hw: &mut P, user: MicUser) {
        assert!(self.is_current(user), "removing an inactive mic user");
        self.current_users.remove(user.into());
        self.apply_aec_use_case(hw);
        let stream = self.stream_index(user);
        self.streams[stream] = None;
    }

    fn stream_index(&self, user: MicUser) -> usize {
        match self.stream_of(user) {
            Some(stream) => stream,
            None => panic!("no splitter stream for mic user"),
        }
    }

    fn set_resampled(&mut self, stream: usize, resampled: bool) {
        if let Some(slot) = self.streams[stream].as_mut() {
            slot.resampled = resampled;
        }
    }

    // ------------------------------------------------------------------
    // Low power
    // ------------------------------------------------------------------

    fn any_resampler(&self) -> bool {
        self.streams.iter().flatten().any(|s| s.resampled)
    }

    fn sleep_chains<P: MicPlatform>(&mut self, hw: &mut P) {
        let all_asleep = !self.current_users.is_empty()
            && self.wake_states.intersection(self.current_users).is_empty();
        if all_asleep && self.chains_awake {
            debug!("mic chains sleeping");
            let sources = self.live_sources();
            hw.mics().preserve(&sources);
            if self.any_resampler() {
                hw.resampler().sleep();
            }
            if self.splitter_created {
                hw.splitter().sleep();
            }
            hw.aec().sleep();
            self.chains_awake = false;
        }
    }

    fn wake_chains<P: MicPlatform>(&mut self, hw: &mut P) {
        if !self.chains_awake {
            debug!("mic chains waking");
            hw.aec().wake();
            if self.splitter_created {
                hw.splitter().wake();
            }
            if self.any_resampler() {
                hw.resampler().wake();
            }
            let sources = self.live_sources();
            hw.mics().release(&sources);
            self.chains_awake = true;
        }
    }
}
