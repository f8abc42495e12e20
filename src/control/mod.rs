//! Control-sync client: the console's mirror of the robot's actions,
//! settings and FSM descriptions.
//!
//! The client reads one JSON subscription to the control protocol. Until
//! the first `sync` frame arrives it is *uninitialized*: lookups made with
//! [`ControlClient::with_setting`] and friends are queued. The sync frame
//! builds the catalog, switches the client to *synced* and runs the queued
//! lookups (action lookups first, then setting lookups, each in call order).
//! After that, lookups answer immediately.
//!
//! `update` frames change one setting in place: its trackers fire first,
//! then every listener registered with [`ControlClient::on_setting_change`].
//! Global listeners run after every processed frame, including frames of an
//! unknown type.
//!
//! A later `sync` frame (after a reconnect) merges into the existing
//! catalog. Settings whose path survives keep their identity and trackers
//! and only notify when their value changed.

mod action;
mod channel;
mod frame;
mod fsm;
mod setting;


pub use action::Action;
pub use frame::{
    ActionDescriptor, ControlFrame, ControlMessage, EnumOption, SettingDescriptor, SyncFrame,
    UpdateFrame,
};
pub use fsm::{FsmDescription, FsmState, FsmTransition, FsmWildcardTransition};
pub use setting::{BgrColour, DoubleRange, HsvRange, Setting, SettingKind};

use serde_json::Value;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, error, info, warn};

use self::channel::ControlChannel;
use self::frame::parse_entries;
use crate::closeable::{CallbackHandle, CallbackList};
use crate::subscription::{Multiplexer, SubscribeOptions, Subscription};
use crate::types::{ProtocolName, SocketError, protocols};
use crate::{ConsoleError, Result};

type Deferred = Box<dyn FnOnce(&Catalog) + Send>;

/// Everything the last sync frame described.
#[derive(Default)]
struct Catalog {
    actions: Vec<Action>,
    settings: Vec<Setting>,
    fsms: Vec<FsmDescription>,
    motion_scripts: Vec<Value>,
}

impl Catalog {
    fn setting(&self, path: &str) -> Option<Setting> {
        self.settings.iter().find(|s| s.path() == path).cloned()
    }

    fn settings_with_prefix(&self, prefix: &str) -> Vec<Setting> {
        self.settings.iter().filter(|s| s.path().starts_with(prefix)).cloned().collect()
    }

    fn action(&self, id: &str) -> Option<Action> {
        self.actions.iter().find(|a| a.id() == id).cloned()
    }

    fn actions_with_prefix(&self, prefix: &str) -> Vec<Action> {
        self.actions.iter().filter(|a| a.id().starts_with(prefix)).cloned().collect()
    }
}

enum SyncState {
    Uninitialized { action_lookups: Vec<Deferred>, setting_lookups: Vec<Deferred> },
    Synced(Arc<Catalog>),
}

/// Raw JSON of the last sync, kept for diagnostic export.
#[derive(Default)]
struct Mirrors {
    actions: Option<Vec<Value>>,
    settings: Option<Vec<Value>>,
}

enum LookupQueue {
    Actions,
    Settings,
}

pub(crate) struct ControlInner {
    multiplexer: Multiplexer,
    protocol: ProtocolName,
    state: Mutex<SyncState>,
    mirrors: Mutex<Mirrors>,
    subscription: Mutex<Option<Subscription>>,
    listeners: CallbackList<()>,
}

/// Client for the control protocol. Cheap to clone.
#[derive(Clone)]
pub struct ControlClient {
    inner: Arc<ControlInner>,
}

impl ControlClient {
    /// Client for the standard control protocol.
    pub fn new(multiplexer: Multiplexer) -> Self {
        Self::with_protocol(multiplexer, protocols::CONTROL)
    }

    /// Client for a control channel served under another protocol name.
    pub fn with_protocol(multiplexer: Multiplexer, protocol: impl Into<ProtocolName>) -> Self {
        Self {
            inner: Arc::new(ControlInner {
                multiplexer,
                protocol: protocol.into(),
                state: Mutex::new(SyncState::Uninitialized {
                    action_lookups: Vec::new(),
                    setting_lookups: Vec::new(),
                }),
                mirrors: Mutex::new(Mirrors::default()),
                subscription: Mutex::new(None),
                listeners: CallbackList::new(),
            }),
        }
    }

    pub(crate) fn from_inner(inner: Arc<ControlInner>) -> Self {
        Self { inner }
    }

    pub fn protocol(&self) -> &ProtocolName {
        &self.inner.protocol
    }

    /// Subscribe to the control protocol.
    ///
    /// `on_error` receives transport errors of the control socket. Fails
    /// with [`ConsoleError::AlreadyConnected`] when already connected. A
    /// subscription the multiplexer has force-closed does not count.
    pub fn connect<F>(&self, on_error: F) -> Result<()>
    where
        F: Fn(&SocketError) + Send + Sync + 'static,
    {
        let mut slot = self.subscription();
        match slot.as_ref() {
            Some(subscription) if !subscription.is_closed() => return Err(ConsoleError::AlreadyConnected),
            Some(_) => {
                warn!(protocol = %self.inner.protocol, "Replacing closed control subscription");
                *slot = None;
            }
            None => {}
        }

        let client = Arc::downgrade(&self.inner);
        let options = SubscribeOptions::json(move |payload| {
            if let (Some(inner), Some(frame)) = (client.upgrade(), payload.as_json()) {
                ControlClient::from_inner(inner).handle_frame(frame);
            }
            Ok(())
        })
        .on_error(on_error);

        *slot = Some(self.inner.multiplexer.subscribe(self.inner.protocol.clone(), options)?);
        info!(protocol = %self.inner.protocol, "Control client connected");
        Ok(())
    }

    /// Close the control subscription. The catalog is kept.
    pub fn disconnect(&self) {
        let subscription = self.subscription().take();
        if let Some(subscription) = subscription {
            subscription.close();
            info!(protocol = %self.inner.protocol, "Control client disconnected");
        }
    }

    pub fn is_connected(&self) -> bool {
        self.subscription().as_ref().is_some_and(|s| !s.is_closed())
    }

    /// Send a command to the robot. There is no acknowledgement.
    pub fn send(&self, message: &ControlMessage) -> Result<()> {
        let slot = self.subscription();
        let subscription =
            slot.as_ref().filter(|s| !s.is_closed()).ok_or(ConsoleError::NotConnected)?;
        debug!(?message, "Sending control message");
        subscription.send_json(message)
    }

    /// Process one decoded control frame.
    pub fn handle_frame(&self, frame: &Value) {
        match ControlFrame::from_value(frame) {
            Ok(ControlFrame::Sync(sync)) => self.apply_sync(sync),
            Ok(ControlFrame::Update(update)) => self.apply_update(update),
            Ok(ControlFrame::Unsupported(kind)) => {
                error!(kind = %kind, "Unsupported control data type");
            }
            Err(e) => {
                error!(error = %e, "Ignoring malformed control frame");
                return;
            }
        }
        self.inner.listeners.notify(&());
    }

    fn apply_sync(&self, sync: SyncFrame) {
        let channel = ControlChannel::new(Arc::downgrade(&self.inner));
        let action_descriptors: Vec<ActionDescriptor> = parse_entries("action", &sync.actions);
        let setting_descriptors: Vec<SettingDescriptor> = parse_entries("setting", &sync.settings);
        let fsms: Vec<FsmDescription> = parse_entries("fsm", &sync.fsms);

        let mut changed = Vec::new();
        let mut state = self.state();
        let previous = match &*state {
            SyncState::Synced(catalog) => Some(Arc::clone(catalog)),
            SyncState::Uninitialized { .. } => None,
        };

        let settings = setting_descriptors
            .iter()
            .map(|descriptor| match previous.as_ref().and_then(|c| c.setting(&descriptor.path)) {
                Some(existing) => {
                    if let Some(value) = existing.refresh(descriptor) {
                        changed.push((existing.clone(), value));
                    }
                    existing
                }
                None => Setting::new(descriptor, channel.clone()),
            })
            .collect();

        let catalog = Arc::new(Catalog {
            actions: action_descriptors
                .into_iter()
                .map(|descriptor| Action::new(descriptor, channel.clone()))
                .collect(),
            settings,
            fsms,
            motion_scripts: sync.motion_scripts,
        });

        let replaced = std::mem::replace(&mut *state, SyncState::Synced(Arc::clone(&catalog)));
        drop(state);

        {
            let mut mirrors = self.mirrors();
            mirrors.actions = Some(sync.actions);
            mirrors.settings = Some(sync.settings);
        }

        info!(
            actions = catalog.actions.len(),
            settings = catalog.settings.len(),
            fsms = catalog.fsms.len(),
            resync = previous.is_some(),
            "Received control data"
        );

        if let SyncState::Uninitialized { action_lookups, setting_lookups } = replaced {
            debug!(
                actions = action_lookups.len(),
                settings = setting_lookups.len(),
                "Flushing queued lookups"
            );
            for lookup in action_lookups {
                lookup(&catalog);
            }
            for lookup in setting_lookups {
                lookup(&catalog);
            }
        }

        for (setting, value) in changed {
            setting.apply_update(value);
        }
    }

    fn apply_update(&self, update: UpdateFrame) {
        let Some(catalog) = self.catalog() else {
            warn!(path = %update.path, "Setting update received before sync, ignoring");
            return;
        };

        debug!(path = %update.path, value = %update.value, "Updating setting value");

        {
            let mut mirrors = self.mirrors();
            let mirrored = mirrors.settings.as_mut().and_then(|settings| {
                settings
                    .iter_mut()
                    .find(|entry| entry.get("path").and_then(Value::as_str) == Some(update.path.as_str()))
            });
            match mirrored {
                Some(entry) => entry["value"] = update.value.clone(),
                None => error!(path = %update.path, "No setting known with path"),
            }
        }

        match catalog.setting(&update.path) {
            Some(setting) => setting.apply_update(update.value),
            None => error!(path = %update.path, "Update for unknown setting"),
        }
    }

    /// Register a listener called after every processed control frame.
    pub fn on_setting_change<F>(&self, listener: F) -> CallbackHandle
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.inner.listeners.add(move |_: &()| listener())
    }

    pub fn is_synced(&self) -> bool {
        self.catalog().is_some()
    }

    /// Setting with exactly this path, if synced and present.
    pub fn setting(&self, path: &str) -> Option<Setting> {
        self.catalog()?.setting(path)
    }

    /// All settings in catalog order; empty before sync.
    pub fn settings(&self) -> Vec<Setting> {
        self.catalog().map(|c| c.settings.clone()).unwrap_or_default()
    }

    pub fn action(&self, id: &str) -> Option<Action> {
        self.catalog()?.action(id)
    }

    /// All actions in catalog order; empty before sync.
    pub fn actions(&self) -> Vec<Action> {
        self.catalog().map(|c| c.actions.clone()).unwrap_or_default()
    }

    pub fn fsm(&self, name: &str) -> Option<FsmDescription> {
        self.catalog()?.fsms.iter().find(|fsm| fsm.name == name).cloned()
    }

    pub fn fsms(&self) -> Vec<FsmDescription> {
        self.catalog().map(|c| c.fsms.clone()).unwrap_or_default()
    }

    /// Motion scripts of the last sync, as raw JSON.
    pub fn motion_scripts(&self) -> Vec<Value> {
        self.catalog().map(|c| c.motion_scripts.clone()).unwrap_or_default()
    }

    /// Call `callback` with the setting at `path` once the catalog exists.
    ///
    /// Runs immediately when synced, otherwise when the first sync frame
    /// is processed. A missing setting is logged and passed as `None`.
    pub fn with_setting<F>(&self, path: impl Into<String>, callback: F)
    where
        F: FnOnce(Option<Setting>) + Send + 'static,
    {
        let path = path.into();
        self.defer(LookupQueue::Settings, move |catalog| {
            let found = catalog.setting(&path);
            if found.is_none() {
                error!(%path, "No setting exists with path");
            }
            callback(found);
        });
    }

    /// Call `callback` with every setting whose path starts with `prefix`.
    ///
    /// The match is a plain string prefix, not segment aware.
    pub fn with_settings<F>(&self, prefix: impl Into<String>, callback: F)
    where
        F: FnOnce(Vec<Setting>) + Send + 'static,
    {
        let prefix = prefix.into();
        self.defer(LookupQueue::Settings, move |catalog| {
            let matches = catalog.settings_with_prefix(&prefix);
            if matches.is_empty() {
                error!(%prefix, "No settings exist with path prefix");
            }
            callback(matches);
        });
    }

    pub fn with_action<F>(&self, id: impl Into<String>, callback: F)
    where
        F: FnOnce(Option<Action>) + Send + 'static,
    {
        let id = id.into();
        self.defer(LookupQueue::Actions, move |catalog| {
            let found = catalog.action(&id);
            if found.is_none() {
                error!(%id, "No action exists with id");
            }
            callback(found);
        });
    }

    pub fn with_actions<F>(&self, prefix: impl Into<String>, callback: F)
    where
        F: FnOnce(Vec<Action>) + Send + 'static,
    {
        let prefix = prefix.into();
        self.defer(LookupQueue::Actions, move |catalog| {
            let matches = catalog.actions_with_prefix(&prefix);
            if matches.is_empty() {
                error!(%prefix, "No actions exist with id prefix");
            }
            callback(matches);
        });
    }

    /// Pretty JSON of the synced settings whose path contains `matching`.
    ///
    /// An empty `matching` exports everything; before sync the text is empty.
    pub fn config_text(&self, matching: &str) -> String {
        let mirrors = self.mirrors();
        export_matching(mirrors.settings.as_deref(), "path", matching)
    }

    /// Pretty JSON of the synced actions whose id contains `matching`.
    pub fn action_text(&self, matching: &str) -> String {
        let mirrors = self.mirrors();
        export_matching(mirrors.actions.as_deref(), "id", matching)
    }

    fn defer(&self, queue: LookupQueue, lookup: impl FnOnce(&Catalog) + Send + 'static) {
        let catalog = {
            let mut state = self.state();
            match &mut *state {
                SyncState::Synced(catalog) => Arc::clone(catalog),
                SyncState::Uninitialized { action_lookups, setting_lookups } => {
                    let pending = match queue {
                        LookupQueue::Actions => action_lookups,
                        LookupQueue::Settings => setting_lookups,
                    };
                    pending.push(Box::new(lookup));
                    return;
                }
            }
        };
        lookup(&catalog);
    }

    fn catalog(&self) -> Option<Arc<Catalog>> {
        match &*self.state() {
            SyncState::Synced(catalog) => Some(Arc::clone(catalog)),
            SyncState::Uninitialized { .. } => None,
        }
    }

    fn state(&self) -> MutexGuard<'_, SyncState> {
        self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn mirrors(&self) -> MutexGuard<'_, Mirrors> {
        self.inner.mirrors.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn subscription(&self) -> MutexGuard<'_, Option<Subscription>> {
        self.inner.subscription.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for ControlClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ControlClient")
            .field("protocol", &self.inner.protocol)
            .field("synced", &self.is_synced())
            .field("connected", &self.is_connected())
            .finish()
    }
}

fn export_matching(entries: Option<&[Value]>, key: &str, matching: &str) -> String {
    let Some(entries) = entries else {
        return String::new();
    };

    let selected: Vec<&Value> = entries
        .iter()
        .filter(|entry| {
            matching.is_empty()
                || entry.get(key).and_then(Value::as_str).is_some_and(|field| field.contains(matching))
        })
        .collect();

    let mut buffer = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut serializer = serde_json::Serializer::with_formatter(&mut buffer, formatter);
    if let Err(e) = serde::Serialize::serialize(&selected, &mut serializer) {
        error!(error = %e, "Failed to export control data");
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}
