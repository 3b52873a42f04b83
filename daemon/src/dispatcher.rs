/// Fans a priority notification out to every enabled channel.
///
/// Each channel is independent: a sender either hands work to its own queue
/// (webhook, tray, feed), or does something quick and infallible in place
/// (private message, sound). Nothing here waits on I/O, and no channel's
/// failure reaches another channel or the caller.
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Local};

use crate::chat::{ChatSink, CHAT_SENDER};
use crate::config::Settings;
use crate::feed::FeedHandle;
use crate::loot::{ItemStack, LootEvent};
use crate::sound::SoundPlayer;
use crate::tray::{TrayJob, TrayQueue};
use crate::webhook::{WebhookHandle, WebhookPayload, WebhookRequest};

const PET_TITLE: &str = "Pet Drop";

pub const TEST_ITEM: &str = "Test Item";
pub const TEST_NPC: &str = "TestNpc";
pub const TEST_PLAYER: &str = "TestPlayer";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    Webhook,
    PrivateMessage,
    Tray,
    Sound,
    Feed,
}

impl Channel {
    pub const ALL: [Channel; 5] = [
        Channel::Webhook,
        Channel::PrivateMessage,
        Channel::Tray,
        Channel::Sound,
        Channel::Feed,
    ];

    pub fn is_enabled(self, settings: &Settings) -> bool {
        let c = &settings.channels;
        match self {
            Channel::Webhook => c.discord,
            Channel::PrivateMessage => c.private_message,
            Channel::Tray => c.tray,
            Channel::Sound => c.sound,
            Channel::Feed => c.feed,
        }
    }
}

/// What one channel is asked to deliver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationRequest {
    pub channel: Channel,
    pub item_name: String,
    pub npc_name: Option<String>,
    pub player_name: Option<String>,
    pub quantity: u32,
    /// Set for pet notifications, which carry the chat line instead of an item.
    pub raw_message: Option<String>,
}

impl NotificationRequest {
    pub fn loot(channel: Channel, item: &ItemStack, event: &LootEvent) -> Self {
        Self {
            channel,
            item_name: item.name.clone(),
            npc_name: Some(event.source_name.clone()),
            player_name: Some(event.player_name.clone()),
            quantity: item.quantity,
            raw_message: None,
        }
    }

    pub fn pet(channel: Channel, message: &str) -> Self {
        Self {
            channel,
            item_name: String::new(),
            npc_name: None,
            player_name: None,
            quantity: 1,
            raw_message: Some(message.to_string()),
        }
    }

    /// `"3x Mystery Box"`, or the pet message.
    pub fn summary(&self) -> String {
        match &self.raw_message {
            Some(message) => message.clone(),
            None => format!("{}x {}", self.quantity, self.item_name),
        }
    }

    pub fn webhook_payload(&self) -> WebhookPayload {
        match &self.raw_message {
            Some(message) => WebhookPayload::single(PET_TITLE, message.as_str()),
            None => WebhookPayload::single(
                self.item_name.as_str(),
                format!(
                    "{} dropped by {} for {}",
                    self.summary(),
                    self.npc_name.as_deref().unwrap_or_default(),
                    self.player_name.as_deref().unwrap_or_default(),
                ),
            ),
        }
    }

    pub fn chat_text(&self) -> String {
        match &self.raw_message {
            Some(message) => message.clone(),
            None => format!("You received {}!", self.summary()),
        }
    }

    /// Pet drops go to the tray like any other notification, shown with the
    /// game message as-is.
    pub fn tray_job(&self) -> TrayJob {
        match &self.raw_message {
            Some(message) => TrayJob::verbatim(message.as_str()),
            None => TrayJob::received(self.summary()),
        }
    }

    /// Feed text without the clock prefix, which the feed adds itself.
    pub fn feed_text(&self) -> String {
        match &self.raw_message {
            Some(message) => message.clone(),
            None => format!(
                "{} from {}",
                self.item_name,
                self.npc_name.as_deref().unwrap_or_default()
            ),
        }
    }
}

/// Most recent notification handed to the channels, for status reporting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LastNotification {
    pub text: String,
    pub at: DateTime<Local>,
}

/// Channel senders plus the bookkeeping shared across dispatch calls.
pub struct Dispatcher {
    webhook: WebhookHandle,
    chat: Arc<dyn ChatSink>,
    tray: TrayQueue,
    sound: Arc<dyn SoundPlayer>,
    feed: FeedHandle,
    last: Mutex<Option<LastNotification>>,
}

impl Dispatcher {
    pub fn new(
        webhook: WebhookHandle,
        chat: Arc<dyn ChatSink>,
        tray: TrayQueue,
        sound: Arc<dyn SoundPlayer>,
        feed: FeedHandle,
    ) -> Self {
        Self {
            webhook,
            chat,
            tray,
            sound,
            feed,
            last: Mutex::new(None),
        }
    }

    /// Notifies about one priority item of `event`.
    pub fn dispatch_loot(&self, item: &ItemStack, event: &LootEvent, settings: &Settings) {
        tracing::info!(
            "[dispatch] {}x {} from {} for {}",
            item.quantity,
            item.name,
            event.source_name,
            event.player_name
        );
        self.fan_out(settings, |channel| NotificationRequest::loot(channel, item, event));
    }

    /// Notifies about a pet drop message.
    pub fn dispatch_pet(&self, message: &str, settings: &Settings) {
        tracing::info!("[dispatch] Pet: {message}");
        self.fan_out(settings, |channel| NotificationRequest::pet(channel, message));
    }

    /// Sends a fixed sample drop through every enabled channel.
    pub fn send_test_notification(&self, settings: &Settings) {
        let item = ItemStack {
            name: TEST_ITEM.to_string(),
            quantity: 1,
        };
        let event = LootEvent {
            source_name: TEST_NPC.to_string(),
            player_name: TEST_PLAYER.to_string(),
            items: vec![item.clone()],
        };
        self.dispatch_loot(&item, &event, settings);
    }

    pub fn tray(&self) -> &TrayQueue {
        &self.tray
    }

    pub fn last_notification(&self) -> Option<LastNotification> {
        self.last.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn fan_out<F>(&self, settings: &Settings, build: F)
    where
        F: Fn(Channel) -> NotificationRequest,
    {
        let mut summary = None;
        for channel in Channel::ALL {
            if !channel.is_enabled(settings) {
                continue;
            }
            let request = build(channel);
            summary.get_or_insert_with(|| request.summary());
            self.send(&request, settings);
        }

        if let Some(text) = summary {
            *self.last.lock().unwrap_or_else(PoisonError::into_inner) = Some(LastNotification {
                text,
                at: Local::now(),
            });
        }
    }

    fn send(&self, request: &NotificationRequest, settings: &Settings) {
        match request.channel {
            Channel::Webhook => {
                let Some(url) = settings.webhook_target() else {
                    tracing::debug!("[dispatch] No webhook URL configured; skipping webhook");
                    return;
                };
                self.webhook.submit(WebhookRequest {
                    url: url.to_string(),
                    payload: request.webhook_payload(),
                });
            }
            Channel::PrivateMessage => self.chat.announce(CHAT_SENDER, &request.chat_text()),
            Channel::Tray => self.tray.enqueue(request.tray_job()),
            Channel::Sound => self.sound.play(),
            Channel::Feed => self.feed.append_line(request.feed_text()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use tokio::sync::{mpsc, watch};

    use crate::chat::tests::RecordingChat;
    use crate::classifier::{classify_item, PET_MESSAGES};
    use crate::feed::{run_feed, FeedLine, LootFeed};
    use crate::sound::tests::CountingPlayer;
    use crate::tray::tests::{wait_idle, RecordingDisplay};
    use crate::webhook::tests::RecordingTransport;
    use crate::webhook::{DeliveryStats, WebhookWorker};

    struct Harness {
        dispatcher: Dispatcher,
        worker: WebhookWorker,
        transport: RecordingTransport,
        chat: Arc<RecordingChat>,
        display: Arc<RecordingDisplay>,
        sound: Arc<CountingPlayer>,
        feed_rx: mpsc::Receiver<FeedLine>,
    }

    impl Harness {
        fn new() -> Self {
            let transport = RecordingTransport::with_status(204);
            let (worker, webhook) =
                WebhookWorker::start(transport.clone(), Arc::new(DeliveryStats::default()));
            let chat = Arc::new(RecordingChat::default());
            let display = Arc::new(RecordingDisplay::default());
            let sound = Arc::new(CountingPlayer::default());
            let (feed, feed_rx) = FeedHandle::channel();
            let tray = TrayQueue::new(display.clone(), Duration::from_millis(1));

            Self {
                dispatcher: Dispatcher::new(webhook, chat.clone(), tray, sound.clone(), feed),
                worker,
                transport,
                chat,
                display,
                sound,
                feed_rx,
            }
        }

        /// Stops the workers and returns the feed lines that were queued.
        async fn finish(mut self) -> (Vec<WebhookRequest>, Vec<String>) {
            wait_idle(self.dispatcher.tray()).await;
            self.worker.stop().await;
            let mut lines = Vec::new();
            while let Ok(line) = self.feed_rx.try_recv() {
                lines.push(line.text);
            }
            let calls = self.transport.calls.lock().unwrap().clone();
            (calls, lines)
        }
    }

    fn settings_with_url() -> Settings {
        Settings {
            webhook_url: "https://discord.invalid/api/webhooks/1/abc".to_string(),
            ..Settings::default()
        }
    }

    fn goblin_drop(name: &str, quantity: u32) -> LootEvent {
        LootEvent {
            source_name: "Goblin".to_string(),
            player_name: "Zezima".to_string(),
            items: vec![ItemStack {
                name: name.to_string(),
                quantity,
            }],
        }
    }

    // ── request rendering ─────────────────────────────────────────────────────

    #[test]
    fn loot_request_renders_every_channel_text() {
        let event = goblin_drop("Mystery Box", 3);
        let req = NotificationRequest::loot(Channel::Webhook, &event.items[0], &event);

        assert_eq!(req.summary(), "3x Mystery Box");
        assert_eq!(req.chat_text(), "You received 3x Mystery Box!");
        assert_eq!(req.feed_text(), "Mystery Box from Goblin");
        assert_eq!(req.tray_job().body(), "You received 3x Mystery Box!");

        let embed = &req.webhook_payload().embeds[0];
        assert_eq!(embed.title, "Mystery Box");
        assert_eq!(embed.description, "3x Mystery Box dropped by Goblin for Zezima");
        assert_eq!(embed.color, 65_280);
    }

    #[test]
    fn pet_request_uses_raw_message() {
        let req = NotificationRequest::pet(Channel::Tray, PET_MESSAGES[0]);
        assert_eq!(req.chat_text(), PET_MESSAGES[0]);
        assert_eq!(req.feed_text(), PET_MESSAGES[0]);
        assert_eq!(req.tray_job().body(), PET_MESSAGES[0]);
        let embed = &req.webhook_payload().embeds[0];
        assert_eq!(embed.title, "Pet Drop");
        assert_eq!(embed.description, PET_MESSAGES[0]);
    }

    // ── fan-out ───────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn mystery_box_reaches_every_channel() {
        let h = Harness::new();
        let settings = settings_with_url();
        let event = goblin_drop("Mystery Box", 3);
        assert!(classify_item("Mystery Box", &settings).priority);

        h.dispatcher.dispatch_loot(&event.items[0], &event, &settings);

        let chat = Arc::clone(&h.chat);
        let display = Arc::clone(&h.display);
        let sound = Arc::clone(&h.sound);
        let last = h.dispatcher.last_notification();
        let (calls, feed) = h.finish().await;

        assert_eq!(calls.len(), 1);
        assert_eq!(
            calls[0].payload.embeds[0].description,
            "3x Mystery Box dropped by Goblin for Zezima"
        );
        assert_eq!(display.shown(), vec!["3x Mystery Box"]);
        assert_eq!(
            chat.messages(),
            vec![(CHAT_SENDER.to_string(), "You received 3x Mystery Box!".to_string())]
        );
        assert_eq!(sound.count(), 1);
        assert_eq!(feed, vec!["Mystery Box from Goblin"]);
        assert_eq!(last.unwrap().text, "3x Mystery Box");
    }

    #[tokio::test]
    async fn empty_webhook_url_skips_only_the_webhook() {
        let h = Harness::new();
        let settings = Settings {
            webhook_url: "   ".to_string(),
            ..Settings::default()
        };
        let event = goblin_drop("Mystery Box", 1);

        h.dispatcher.dispatch_loot(&event.items[0], &event, &settings);

        let display = Arc::clone(&h.display);
        let sound = Arc::clone(&h.sound);
        let chat = Arc::clone(&h.chat);
        let (calls, feed) = h.finish().await;

        assert!(calls.is_empty());
        assert_eq!(display.shown().len(), 1);
        assert_eq!(sound.count(), 1);
        assert_eq!(chat.messages().len(), 1);
        assert_eq!(feed.len(), 1);
    }

    #[tokio::test]
    async fn disabled_channels_are_not_invoked() {
        let h = Harness::new();
        let mut settings = settings_with_url();
        settings.channels.discord = false;
        settings.channels.tray = false;
        settings.channels.sound = false;
        let event = goblin_drop("Dragon claws", 1);

        h.dispatcher.dispatch_loot(&event.items[0], &event, &settings);

        let display = Arc::clone(&h.display);
        let sound = Arc::clone(&h.sound);
        let chat = Arc::clone(&h.chat);
        let (calls, feed) = h.finish().await;

        assert!(calls.is_empty());
        assert!(display.shown().is_empty());
        assert_eq!(sound.count(), 0);
        assert_eq!(chat.messages().len(), 1);
        assert_eq!(feed, vec!["Dragon claws from Goblin"]);
    }

    #[tokio::test]
    async fn all_channels_disabled_records_nothing() {
        let h = Harness::new();
        let mut settings = settings_with_url();
        settings.channels.discord = false;
        settings.channels.private_message = false;
        settings.channels.tray = false;
        settings.channels.sound = false;
        settings.channels.feed = false;
        let event = goblin_drop("Mystery Box", 1);

        h.dispatcher.dispatch_loot(&event.items[0], &event, &settings);
        assert!(h.dispatcher.last_notification().is_none());
        let (calls, feed) = h.finish().await;
        assert!(calls.is_empty());
        assert!(feed.is_empty());
    }

    #[tokio::test]
    async fn pet_drop_goes_to_every_enabled_channel() {
        let h = Harness::new();
        let settings = settings_with_url();

        h.dispatcher.dispatch_pet(PET_MESSAGES[2], &settings);

        let display = Arc::clone(&h.display);
        let chat = Arc::clone(&h.chat);
        let (calls, feed) = h.finish().await;

        assert_eq!(calls[0].payload.embeds[0].title, "Pet Drop");
        assert_eq!(display.shown(), vec![PET_MESSAGES[2]]);
        assert_eq!(chat.messages()[0].1, PET_MESSAGES[2]);
        assert_eq!(feed, vec![PET_MESSAGES[2]]);
    }

    #[tokio::test]
    async fn test_notification_bypasses_classification() {
        let h = Harness::new();
        let settings = settings_with_url();

        h.dispatcher.send_test_notification(&settings);

        let (calls, feed) = h.finish().await;
        assert_eq!(calls[0].payload.embeds[0].title, TEST_ITEM);
        assert_eq!(
            calls[0].payload.embeds[0].description,
            "1x Test Item dropped by TestNpc for TestPlayer"
        );
        assert_eq!(feed, vec!["Test Item from TestNpc"]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_dispatches_deliver_every_notification() {
        let transport = RecordingTransport::with_status(200);
        let stats = Arc::new(DeliveryStats::default());
        let (worker, webhook) = WebhookWorker::start(transport.clone(), Arc::clone(&stats));
        let display = Arc::new(RecordingDisplay::default());
        let (feed_handle, feed_rx) = FeedHandle::channel();
        let feed = Arc::new(Mutex::new(LootFeed::new(100)));
        let (stop_tx, stop_rx) = watch::channel(false);
        let feed_task = tokio::spawn(run_feed(feed_rx, Arc::clone(&feed), stop_rx));

        let dispatcher = Arc::new(Dispatcher::new(
            webhook,
            Arc::new(RecordingChat::default()),
            TrayQueue::new(display.clone(), Duration::from_micros(50)),
            Arc::new(CountingPlayer::default()),
            feed_handle,
        ));
        let settings = Arc::new(settings_with_url());

        let tasks: Vec<_> = (0..20)
            .map(|i| {
                let dispatcher = Arc::clone(&dispatcher);
                let settings = Arc::clone(&settings);
                tokio::spawn(async move {
                    let event = goblin_drop(&format!("Box {i}"), 1);
                    dispatcher.dispatch_loot(&event.items[0], &event, &settings);
                })
            })
            .collect();
        for t in tasks {
            t.await.unwrap();
        }

        wait_idle(dispatcher.tray()).await;
        worker.stop().await;
        let _ = stop_tx.send(true);
        feed_task.await.unwrap();

        assert_eq!(transport.calls.lock().unwrap().len(), 20);
        assert_eq!(stats.sent(), 20);
        assert_eq!(display.shown().len(), 20);
        assert_eq!(feed.lock().unwrap().len(), 20);
    }
}
