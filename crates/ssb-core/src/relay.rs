use std::{collections::BTreeSet, path::PathBuf, sync::Arc, time::Duration};

use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};
use tokio::sync::Mutex;

use crate::{
    archive::{ArchiveStats, ImageArchive, ImageKind},
    compositor::combine_side_by_side,
    config::Config,
    domain::{MessageRef, UserId},
    errors::Error,
    generation::{pick_style, GenerationClient, Transformed},
    messaging::{port::MessagingPort, types::PhotoMessage},
    registry::UserRegistry,
    Result,
};

pub const PROCESSING_TEXT: &str =
    "🎨 Processing your selfie... This might take a moment!\nPreparing something ridiculous... 😄";
pub const TRANSFORMING_TEXT: &str =
    "🎨 Transforming your selfie...\n\nThis may take 10-30 seconds... ⏳";
pub const FAILURE_TEXT: &str = "😅 Oops! Something went wrong while processing your selfie.\n\n\
Please try again or contact the administrator if the problem persists.";

pub const SURPRISE_CAPTION: &str = "🎁 Surprise! A friend sent you a transformed selfie! 🎭";
pub const SENT_CAPTION: &str =
    "✨ Here is your transformation!\n\nIt was sent to a random friend! 🎭";
pub const FALLBACK_CAPTION: &str =
    "✨ Your transformation!\n\n(Couldn't send to a friend, so here it is!) 🎭";
pub const SELF_CAPTION: &str =
    "✨ Your transformation!\n\n(You're the only user so far, so no one to surprise yet!) 🎭";

/// Progress of a single photo through the relay.
///
/// `Transforming` spans both the generation call and compositing, so a photo
/// that cannot be decoded fails in `Transforming`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stage {
    Received,
    Registered,
    Transforming,
    Composed,
    RecipientChosen,
    Delivered,
}

/// How a photo ended up being delivered.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Delivery {
    /// The recipient got the surprise; the sender got a copy.
    Delivered { recipient: UserId, archived: PathBuf },
    /// Sending to `intended` failed; the sender got the image instead.
    FellBack { intended: UserId, archived: PathBuf },
    /// Nobody else is registered; the image went back to the sender.
    SelfDelivered { archived: PathBuf },
    /// The sender was told something went wrong.
    Failed { stage: Stage, reason: String },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RelayStats {
    pub total_users: usize,
    pub archive: ArchiveStats,
}

#[derive(Clone, Debug)]
pub struct RelaySettings {
    pub styles: Vec<String>,
    pub generation_timeout: Duration,
}

impl From<&Config> for RelaySettings {
    fn from(cfg: &Config) -> Self {
        Self {
            styles: cfg.styles.clone(),
            generation_timeout: cfg.generation_timeout,
        }
    }
}

/// Per-photo delivery pipeline.
///
/// Owns the in-memory registry snapshot; registration runs under its lock so
/// concurrent first-time senders are persisted one after the other.
pub struct Relay {
    registry: UserRegistry,
    users: Mutex<BTreeSet<UserId>>,
    archive: ImageArchive,
    generator: Arc<dyn GenerationClient>,
    messenger: Arc<dyn MessagingPort>,
    settings: RelaySettings,
    rng: std::sync::Mutex<StdRng>,
}

impl Relay {
    pub fn new(
        registry: UserRegistry,
        archive: ImageArchive,
        generator: Arc<dyn GenerationClient>,
        messenger: Arc<dyn MessagingPort>,
        settings: RelaySettings,
    ) -> Self {
        let users = registry.load();
        tracing::info!(users = users.len(), "loaded registered users");
        Self {
            registry,
            users: Mutex::new(users),
            archive,
            generator,
            messenger,
            settings,
            rng: std::sync::Mutex::new(StdRng::from_entropy()),
        }
    }

    /// Replace the random source (styles and recipients), e.g. with a seeded one.
    pub fn with_rng(mut self, rng: StdRng) -> Self {
        self.rng = std::sync::Mutex::new(rng);
        self
    }

    /// Add `user` to the registry. Returns `true` if the user was new.
    pub async fn register(&self, user: UserId) -> bool {
        let mut users = self.users.lock().await;
        if users.contains(&user) {
            return false;
        }
        let updated = self.registry.add(user, std::mem::take(&mut *users));
        *users = updated;
        true
    }

    pub async fn stats(&self) -> RelayStats {
        let total_users = self.users.lock().await.len();
        RelayStats {
            total_users,
            archive: self.archive.stats(),
        }
    }

    /// Run one inbound photo to completion. Never returns an error: failures
    /// are logged and reported to the sender as a generic notice.
    pub async fn handle_photo(&self, photo: &PhotoMessage) -> Delivery {
        let mut stage = Stage::Received;
        match self.run(photo, &mut stage).await {
            Ok(delivery) => delivery,
            Err(e) => {
                tracing::error!(
                    user_id = %photo.user_id,
                    stage = ?stage,
                    error = %e,
                    "error processing image"
                );
                if let Err(e) = self.messenger.send_text(photo.chat_id, FAILURE_TEXT).await {
                    tracing::warn!(user_id = %photo.user_id, error = %e, "failed to send failure notice");
                }
                Delivery::Failed {
                    stage,
                    reason: e.to_string(),
                }
            }
        }
    }

    async fn run(&self, photo: &PhotoMessage, stage: &mut Stage) -> Result<Delivery> {
        let sender = photo.user_id;
        if self.register(sender).await {
            tracing::info!(user_id = %sender, "auto-registered user on photo upload");
        }
        *stage = Stage::Registered;

        let status = self
            .messenger
            .send_text(photo.chat_id, PROCESSING_TEXT)
            .await
            .ok();

        let original = self.messenger.download_file(&photo.file_id).await?;
        let style = self.pick_style()?;

        if let Some(st) = status {
            let _ = self.messenger.edit_text(st, TRANSFORMING_TEXT).await;
        }

        *stage = Stage::Transforming;
        let transformed = self.transform(original.clone(), &style).await?;
        let combined = compose(original, transformed.image).await?;
        *stage = Stage::Composed;

        if let Some(st) = status {
            self.delete_status(st).await;
        }

        let recipient = self.choose_recipient(sender).await;
        *stage = Stage::RecipientChosen;

        let archived = self.archive.save(
            &combined,
            sender,
            recipient,
            &transformed.style,
            ImageKind::Combined,
        )?;

        let delivery = self.deliver(photo, recipient, &combined, archived).await?;
        *stage = Stage::Delivered;

        tracing::info!(
            user_id = %sender,
            recipient = %recipient,
            style = %transformed.style,
            "successfully processed image"
        );
        Ok(delivery)
    }

    fn pick_style(&self) -> Result<String> {
        let mut rng = self.rng.lock().unwrap_or_else(|e| e.into_inner());
        pick_style(&mut *rng, &self.settings.styles)
            .map(|s| s.to_string())
            .ok_or_else(|| Error::Config("no styles configured".to_string()))
    }

    async fn transform(&self, image: Vec<u8>, style: &str) -> Result<Transformed> {
        let timeout = self.settings.generation_timeout;
        match tokio::time::timeout(timeout, self.generator.transform(image, style)).await {
            Ok(res) => res,
            Err(_) => Err(Error::Timeout(timeout)),
        }
    }

    async fn delete_status(&self, msg: MessageRef) {
        if let Err(e) = self.messenger.delete_message(msg).await {
            tracing::debug!(error = %e, "failed to delete status message");
        }
    }

    /// Uniform pick among everyone but the sender; the sender when alone.
    async fn choose_recipient(&self, sender: UserId) -> UserId {
        let others: Vec<UserId> = {
            let users = self.users.lock().await;
            users.iter().copied().filter(|&u| u != sender).collect()
        };
        let mut rng = self.rng.lock().unwrap_or_else(|e| e.into_inner());
        others.choose(&mut *rng).copied().unwrap_or(sender)
    }

    async fn deliver(
        &self,
        photo: &PhotoMessage,
        recipient: UserId,
        combined: &[u8],
        archived: PathBuf,
    ) -> Result<Delivery> {
        let sender = photo.user_id;
        if recipient == sender {
            self.messenger
                .send_photo(photo.chat_id, combined, SELF_CAPTION)
                .await?;
            return Ok(Delivery::SelfDelivered { archived });
        }

        match self
            .messenger
            .send_photo(recipient.chat(), combined, SURPRISE_CAPTION)
            .await
        {
            Ok(_) => {
                self.messenger
                    .send_photo(photo.chat_id, combined, SENT_CAPTION)
                    .await?;
                tracing::info!(user_id = %sender, recipient = %recipient, "sent transformed image");
                Ok(Delivery::Delivered {
                    recipient,
                    archived,
                })
            }
            Err(e) => {
                tracing::error!(
                    user_id = %sender,
                    recipient = %recipient,
                    error = %e,
                    "failed to send to recipient; returning image to sender"
                );
                self.messenger
                    .send_photo(photo.chat_id, combined, FALLBACK_CAPTION)
                    .await?;
                Ok(Delivery::FellBack {
                    intended: recipient,
                    archived,
                })
            }
        }
    }
}

async fn compose(original: Vec<u8>, transformed: Vec<u8>) -> Result<Vec<u8>> {
    tokio::task::spawn_blocking(move || combine_side_by_side(&original, &transformed))
        .await
        .map_err(|e| Error::External(format!("compositor task failed: {e}")))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ChatId, MessageId};
    use async_trait::async_trait;
    use image::{ImageBuffer, ImageFormat, Rgb};
    use std::io::Cursor;
    use std::path::Path;
    use std::sync::Mutex as StdMutex;

    fn png(width: u32, height: u32) -> Vec<u8> {
        let img: ImageBuffer<Rgb<u8>, Vec<u8>> =
            ImageBuffer::from_fn(width, height, |x, _| Rgb([(x % 255) as u8, 80, 160]));
        let mut buf = Cursor::new(Vec::new());
        img.write_to(&mut buf, ImageFormat::Png).unwrap();
        buf.into_inner()
    }

    #[derive(Clone, Debug, PartialEq, Eq)]
    enum Sent {
        Text(ChatId, String),
        Edit(MessageRef, String),
        Delete(MessageRef),
        Photo(ChatId, String),
    }

    #[derive(Default)]
    struct FakeMessenger {
        next_id: StdMutex<i32>,
        sent: StdMutex<Vec<Sent>>,
        fail_photos_to: Option<ChatId>,
        fail_texts: bool,
        photo: Vec<u8>,
    }

    impl FakeMessenger {
        fn with_photo(photo: Vec<u8>) -> Self {
            Self {
                photo,
                ..Default::default()
            }
        }

        fn alloc(&self, chat_id: ChatId) -> MessageRef {
            let mut guard = self.next_id.lock().unwrap();
            *guard += 1;
            MessageRef {
                chat_id,
                message_id: MessageId(*guard),
            }
        }

        fn photos(&self) -> Vec<(ChatId, String)> {
            self.sent
                .lock()
                .unwrap()
                .iter()
                .filter_map(|s| match s {
                    Sent::Photo(c, caption) => Some((*c, caption.clone())),
                    _ => None,
                })
                .collect()
        }

        fn texts(&self) -> Vec<String> {
            self.sent
                .lock()
                .unwrap()
                .iter()
                .filter_map(|s| match s {
                    Sent::Text(_, t) => Some(t.clone()),
                    _ => None,
                })
                .collect()
        }

        fn sent(&self) -> Vec<Sent> {
            self.sent.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl MessagingPort for FakeMessenger {
        async fn send_text(&self, chat_id: ChatId, text: &str) -> Result<MessageRef> {
            if self.fail_texts {
                return Err(Error::External("chat not found".to_string()));
            }
            self.sent
                .lock()
                .unwrap()
                .push(Sent::Text(chat_id, text.to_string()));
            Ok(self.alloc(chat_id))
        }

        async fn edit_text(&self, msg: MessageRef, text: &str) -> Result<()> {
            self.sent
                .lock()
                .unwrap()
                .push(Sent::Edit(msg, text.to_string()));
            Ok(())
        }

        async fn delete_message(&self, msg: MessageRef) -> Result<()> {
            self.sent.lock().unwrap().push(Sent::Delete(msg));
            Ok(())
        }

        async fn send_photo(
            &self,
            chat_id: ChatId,
            image: &[u8],
            caption: &str,
        ) -> Result<MessageRef> {
            assert!(!image.is_empty());
            if self.fail_photos_to == Some(chat_id) {
                return Err(Error::External("bot was blocked by the user".to_string()));
            }
            self.sent
                .lock()
                .unwrap()
                .push(Sent::Photo(chat_id, caption.to_string()));
            Ok(self.alloc(chat_id))
        }

        async fn download_file(&self, _file_id: &str) -> Result<Vec<u8>> {
            Ok(self.photo.clone())
        }
    }

    enum FakeGenerator {
        Ok,
        Fail,
        Hang,
    }

    #[async_trait]
    impl GenerationClient for FakeGenerator {
        async fn transform(&self, _image: Vec<u8>, style: &str) -> Result<Transformed> {
            match self {
                FakeGenerator::Ok => Ok(Transformed {
                    image: png(64, 64),
                    style: format!("{style} (applied)"),
                }),
                FakeGenerator::Fail => Err(Error::Generation("quota exceeded".to_string())),
                FakeGenerator::Hang => {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    unreachable!("timeout should fire first")
                }
            }
        }
    }

    fn relay(
        dir: &Path,
        users: &[i64],
        messenger: Arc<FakeMessenger>,
        generator: FakeGenerator,
    ) -> Relay {
        let registry = UserRegistry::new(dir.join("authorized_users.json"));
        registry
            .try_save(&users.iter().map(|&u| UserId(u)).collect::<BTreeSet<_>>())
            .unwrap();
        Relay::new(
            registry,
            ImageArchive::new(dir.join("generated_images")),
            Arc::new(generator),
            messenger,
            RelaySettings {
                styles: vec!["as a pirate".to_string()],
                generation_timeout: Duration::from_millis(200),
            },
        )
        .with_rng(StdRng::seed_from_u64(42))
    }

    fn photo_from(user: i64) -> PhotoMessage {
        PhotoMessage {
            chat_id: ChatId(user),
            user_id: UserId(user),
            username: None,
            file_id: "file-1".to_string(),
        }
    }

    fn records(dir: &Path) -> Vec<crate::archive::ImageRecord> {
        ImageArchive::new(dir.join("generated_images"))
            .try_records()
            .unwrap()
    }

    #[tokio::test]
    async fn lone_user_gets_own_image_back() {
        let dir = tempfile::tempdir().unwrap();
        let messenger = Arc::new(FakeMessenger::with_photo(png(120, 80)));
        let relay = relay(dir.path(), &[], messenger.clone(), FakeGenerator::Ok);

        let delivery = relay.handle_photo(&photo_from(111)).await;
        assert!(matches!(delivery, Delivery::SelfDelivered { .. }), "{delivery:?}");

        let registry = UserRegistry::new(dir.path().join("authorized_users.json"));
        assert_eq!(registry.try_load().unwrap(), BTreeSet::from([UserId(111)]));

        let recs = records(dir.path());
        assert_eq!(recs.len(), 1);
        assert_eq!(recs[0].sender_id, UserId(111));
        assert_eq!(recs[0].receiver_id, UserId(111));
        assert_eq!(recs[0].style, "as a pirate (applied)");

        assert_eq!(messenger.photos(), vec![(ChatId(111), SELF_CAPTION.to_string())]);
    }

    #[tokio::test]
    async fn only_other_user_is_the_recipient() {
        let dir = tempfile::tempdir().unwrap();
        let messenger = Arc::new(FakeMessenger::with_photo(png(80, 120)));
        let relay = relay(dir.path(), &[111, 222], messenger.clone(), FakeGenerator::Ok);

        let delivery = relay.handle_photo(&photo_from(111)).await;
        let Delivery::Delivered { recipient, archived } = delivery else {
            panic!("unexpected delivery: {delivery:?}");
        };
        assert_eq!(recipient, UserId(222));
        assert!(archived.exists());

        let recs = records(dir.path());
        assert_eq!(recs.len(), 1);
        assert_eq!(recs[0].sender_id, UserId(111));
        assert_eq!(recs[0].receiver_id, UserId(222));
        assert_eq!(
            archived.file_name().unwrap().to_str().unwrap(),
            recs[0].filename
        );

        assert_eq!(
            messenger.photos(),
            vec![
                (ChatId(222), SURPRISE_CAPTION.to_string()),
                (ChatId(111), SENT_CAPTION.to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn recipient_is_never_the_sender_when_others_exist() {
        let dir = tempfile::tempdir().unwrap();
        let messenger = Arc::new(FakeMessenger::with_photo(png(50, 50)));
        let relay = relay(dir.path(), &[1, 2, 3, 4], messenger, FakeGenerator::Ok);

        for _ in 0..8 {
            match relay.handle_photo(&photo_from(3)).await {
                Delivery::Delivered { recipient, .. } => assert_ne!(recipient, UserId(3)),
                other => panic!("unexpected delivery: {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn failed_send_falls_back_to_sender() {
        let dir = tempfile::tempdir().unwrap();
        let messenger = Arc::new(FakeMessenger {
            fail_photos_to: Some(ChatId(222)),
            ..FakeMessenger::with_photo(png(60, 60))
        });
        let relay = relay(dir.path(), &[111, 222], messenger.clone(), FakeGenerator::Ok);

        let delivery = relay.handle_photo(&photo_from(111)).await;
        assert!(
            matches!(delivery, Delivery::FellBack { intended: UserId(222), .. }),
            "{delivery:?}"
        );
        assert_eq!(
            messenger.photos(),
            vec![(ChatId(111), FALLBACK_CAPTION.to_string())]
        );
        assert!(!messenger.texts().contains(&FAILURE_TEXT.to_string()));
        // The record keeps the intended recipient.
        assert_eq!(records(dir.path())[0].receiver_id, UserId(222));
    }

    #[tokio::test]
    async fn generation_failure_notifies_sender() {
        let dir = tempfile::tempdir().unwrap();
        let messenger = Arc::new(FakeMessenger::with_photo(png(60, 60)));
        let relay = relay(dir.path(), &[111, 222], messenger.clone(), FakeGenerator::Fail);

        let delivery = relay.handle_photo(&photo_from(111)).await;
        assert!(
            matches!(delivery, Delivery::Failed { stage: Stage::Transforming, .. }),
            "{delivery:?}"
        );
        assert!(messenger.photos().is_empty());
        assert_eq!(messenger.texts().last().unwrap(), FAILURE_TEXT);
        assert!(records(dir.path()).is_empty());
    }

    #[tokio::test]
    async fn hung_generation_times_out() {
        let dir = tempfile::tempdir().unwrap();
        let messenger = Arc::new(FakeMessenger::with_photo(png(60, 60)));
        let relay = relay(dir.path(), &[111], messenger.clone(), FakeGenerator::Hang);

        let delivery = relay.handle_photo(&photo_from(111)).await;
        let Delivery::Failed { reason, .. } = delivery else {
            panic!("unexpected delivery: {delivery:?}");
        };
        assert!(reason.contains("timed out"), "{reason}");
        assert_eq!(messenger.texts().last().unwrap(), FAILURE_TEXT);
    }

    #[tokio::test]
    async fn undecodable_photo_fails_but_still_registers() {
        let dir = tempfile::tempdir().unwrap();
        let messenger = Arc::new(FakeMessenger::with_photo(b"not a jpeg".to_vec()));
        let relay = relay(dir.path(), &[], messenger.clone(), FakeGenerator::Ok);

        let delivery = relay.handle_photo(&photo_from(7)).await;
        assert!(
            matches!(delivery, Delivery::Failed { stage: Stage::Transforming, .. }),
            "{delivery:?}"
        );
        let registry = UserRegistry::new(dir.path().join("authorized_users.json"));
        assert_eq!(registry.try_load().unwrap(), BTreeSet::from([UserId(7)]));
        assert_eq!(relay.stats().await.total_users, 1);
        assert_eq!(messenger.texts().last().unwrap(), FAILURE_TEXT);
    }

    #[tokio::test]
    async fn register_reports_new_users_once() {
        let dir = tempfile::tempdir().unwrap();
        let messenger = Arc::new(FakeMessenger::default());
        let relay = relay(dir.path(), &[5], messenger, FakeGenerator::Ok);

        assert!(!relay.register(UserId(5)).await);
        assert!(relay.register(UserId(6)).await);
        assert!(!relay.register(UserId(6)).await);

        let stats = relay.stats().await;
        assert_eq!(stats.total_users, 2);
        assert_eq!(stats.archive, ArchiveStats::default());
    }

    #[tokio::test]
    async fn status_message_is_edited_then_deleted() {
        let dir = tempfile::tempdir().unwrap();
        let messenger = Arc::new(FakeMessenger::with_photo(png(60, 60)));
        let relay = relay(dir.path(), &[111, 222], messenger.clone(), FakeGenerator::Ok);

        relay.handle_photo(&photo_from(111)).await;

        let status = MessageRef {
            chat_id: ChatId(111),
            message_id: MessageId(1),
        };
        assert_eq!(
            messenger.sent(),
            vec![
                Sent::Text(ChatId(111), PROCESSING_TEXT.to_string()),
                Sent::Edit(status, TRANSFORMING_TEXT.to_string()),
                Sent::Delete(status),
                Sent::Photo(ChatId(222), SURPRISE_CAPTION.to_string()),
                Sent::Photo(ChatId(111), SENT_CAPTION.to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn unsendable_status_does_not_stop_delivery() {
        let dir = tempfile::tempdir().unwrap();
        let messenger = Arc::new(FakeMessenger {
            fail_texts: true,
            ..FakeMessenger::with_photo(png(60, 60))
        });
        let relay = relay(dir.path(), &[111, 222], messenger.clone(), FakeGenerator::Ok);

        let delivery = relay.handle_photo(&photo_from(111)).await;
        assert!(
            matches!(delivery, Delivery::Delivered { recipient: UserId(222), .. }),
            "{delivery:?}"
        );
        assert_eq!(
            messenger.sent(),
            vec![
                Sent::Photo(ChatId(222), SURPRISE_CAPTION.to_string()),
                Sent::Photo(ChatId(111), SENT_CAPTION.to_string()),
            ]
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_registrations_are_all_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let messenger = Arc::new(FakeMessenger::default());
        let relay = Arc::new(relay(dir.path(), &[], messenger, FakeGenerator::Ok));

        let tasks: Vec<_> = (1..=16)
            .map(|id| {
                let relay = relay.clone();
                tokio::spawn(async move { relay.register(UserId(id)).await })
            })
            .collect();
        for task in tasks {
            assert!(task.await.unwrap());
        }

        let registry = UserRegistry::new(dir.path().join("authorized_users.json"));
        let expected: BTreeSet<UserId> = (1..=16).map(UserId).collect();
        assert_eq!(registry.try_load().unwrap(), expected);
        assert_eq!(relay.stats().await.total_users, 16);
    }
}
