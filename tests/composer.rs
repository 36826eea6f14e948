mod common;

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use bytes::Bytes;
    use tokio::time::sleep;
    use url::Url;

    use thread_sync::composer;
    use thread_sync::composer::deep_link::DeepLink;
    use thread_sync::composer::recorder::ScriptedMicrophone;
    use thread_sync::integration::blob::BlobPath;
    use thread_sync::message::model::{Listing, State};
    use thread_sync::message::{Kind, MediaKind};
    use thread_sync::session::Route;

    use crate::common::{self, DelayedAcks, Fixture, THREAD};

    const fn ms(millis: u64) -> Duration {
        Duration::from_millis(millis)
    }

    fn desk() -> Listing {
        Listing {
            id: "7".into(),
            name: "Oak desk".into(),
            image: None,
            price: 120.0,
            currency: "USD".into(),
            url: None,
            unit: None,
            kind: None,
        }
    }

    #[tokio::test]
    async fn attachment_and_text_make_one_product_message() {
        let f = Fixture::new();
        let session = f.open().await;
        let composer = session.composer();

        composer.attach(desk());
        composer.set_text("Is it still available?");
        let sent = composer.send().await.unwrap();

        assert_eq!(sent.kind(), Kind::Product);
        assert_eq!(sent.content().text(), Some("Is it still available?"));
        assert_eq!(sent.content().listing(), Some(&desk()));
        assert_eq!(sent.state(), &State::Sent);

        assert!(composer.attachment().is_none());
        assert!(composer.text().is_empty());
        assert_eq!(f.store.message_count(&THREAD.into()), 1);

        let referenced = f
            .services
            .threads
            .referenced_listing(&THREAD.into())
            .await
            .unwrap();
        assert_eq!(referenced, Some(desk()));
    }

    #[tokio::test]
    async fn attachment_alone_is_sent_without_text() {
        let f = Fixture::new();
        let session = f.open().await;

        session.composer().attach(desk());
        session.composer().set_text("   ");
        let sent = session.composer().send().await.unwrap();

        assert_eq!(sent.kind(), Kind::Product);
        assert_eq!(sent.content().text(), None);
    }

    #[tokio::test]
    async fn blank_draft_is_not_sent() {
        let f = Fixture::new();
        let session = f.open().await;

        session.composer().set_text(" \n ");
        let res = session.composer().send().await;

        assert!(matches!(res, Err(composer::Error::EmptyMessage)));
        assert_eq!(f.store.message_count(&THREAD.into()), 0);
        assert!(session.stream().messages().await.is_empty());
    }

    #[tokio::test]
    async fn rejected_send_marks_the_echo_failed() {
        let f = Fixture::new();
        let session = f.open().await;
        f.store.set_failing_inserts(true);

        session.composer().set_text("lost");
        assert!(session.composer().send().await.is_err());

        let messages = session.stream().messages().await;
        assert_eq!(messages.len(), 1);
        assert!(messages[0].is_error());
        assert_eq!(f.store.message_count(&THREAD.into()), 0);
    }

    #[tokio::test]
    async fn deep_link_is_sent_once() {
        let f = Fixture::new();
        let url =
            Url::parse("app://threads/t1?peer=u2&listing_id=7&name=Oak%20desk&price=120").unwrap();
        let session = f.open_route(Route::parse(&url).unwrap()).await;

        assert_eq!(f.store.message_count(&THREAD.into()), 1);
        common::wait_for_messages(session.stream(), |m| m.len() == 1).await;
        let sent = session.stream().messages().await.remove(0);
        let listing = sent.content().listing().unwrap();
        assert_eq!(listing.id, "7");
        assert_eq!(listing.name, "Oak desk");
        assert_eq!(listing.price, 120.0);

        let again = session
            .composer()
            .apply_deep_link(DeepLink::from_url(&url).unwrap())
            .await
            .unwrap();
        assert!(again.is_none());
        assert_eq!(f.store.message_count(&THREAD.into()), 1);
    }

    #[tokio::test]
    async fn attaches_the_last_referenced_listing() {
        let f = Fixture::new();
        let session = f.open().await;
        let composer = session.composer();

        assert!(matches!(
            composer.attach_last_referenced().await,
            Err(composer::Error::NoReferencedListing)
        ));

        composer.attach(desk());
        composer.send().await.unwrap();

        let listing = composer.attach_last_referenced().await.unwrap();
        assert_eq!(listing, desk());
        assert_eq!(composer.attachment(), Some(desk()));
    }

    #[tokio::test]
    async fn image_upload_settles_the_placeholder() {
        let f = Fixture::new();
        let session = f.open().await;

        let sent = session
            .composer()
            .send_image(Bytes::from_static(b"\x89PNG"), "cat.png", "image/png")
            .await
            .unwrap();

        assert_eq!(sent.kind(), Kind::Image);
        assert_eq!(sent.state(), &State::Sent);

        let path = BlobPath::media(&THREAD.into(), MediaKind::Image, sent.id(), "cat.png");
        assert_eq!(
            path.to_string(),
            format!("threads/{THREAD}/images/{}/cat.png", sent.id())
        );
        let blob = f.blobs.get(&path).unwrap();
        assert_eq!(blob.content, Bytes::from_static(b"\x89PNG"));
        assert_eq!(blob.content_type, "image/png");

        let stored = f.store.find_message(&THREAD.into(), sent.id()).unwrap();
        assert_eq!(stored.state(), &State::Sent);
        assert!(stored.content().media_url().is_some());
    }

    #[tokio::test]
    async fn failed_upload_leaves_a_failed_message() {
        let f = Fixture::new();
        let session = f.open().await;
        f.blobs.set_failing(true);

        let sent = session
            .composer()
            .send_image(Bytes::from_static(b"\x89PNG"), "cat.png", "image/png")
            .await
            .unwrap();

        assert!(sent.is_error());
        assert!(!sent.is_uploading());
        let stored = f.store.find_message(&THREAD.into(), sent.id()).unwrap();
        assert!(stored.is_error());

        common::wait_for_messages(session.stream(), |m| m.iter().all(|m| m.is_error())).await;
        assert!(f.blobs.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_upload_times_out() {
        let f = Fixture::new();
        let session = f.open().await;
        f.blobs.set_stalled(true);

        let sent = session
            .composer()
            .send_image(Bytes::from_static(b"\x89PNG"), "cat.png", "image/png")
            .await
            .unwrap();

        match sent.state() {
            State::Failed { reason } => assert!(reason.contains("timed out"), "{reason}"),
            other => panic!("expected a failed message, got {other:?}"),
        }
        let local = session.stream().get(sent.id()).await.unwrap();
        assert!(!local.is_uploading());
    }

    #[tokio::test(start_paused = true)]
    async fn rapid_sends_render_in_send_order() {
        let f = Fixture::new();
        let acks = DelayedAcks::new(f.store.clone(), [500, 100, 400, 0, 250].map(ms));
        let f = f.with_messages(Arc::new(acks));
        let session = Arc::new(f.open().await);

        let mut sends = Vec::new();
        for i in 0..5 {
            session.composer().set_text(format!("msg {i}"));
            let session = Arc::clone(&session);
            sends.push(tokio::spawn(
                async move { session.composer().send().await },
            ));
            sleep(ms(1)).await;
        }

        let expected = (0..5).map(|i| format!("msg {i}")).collect::<Vec<_>>();
        assert_eq!(common::texts(&session.stream().messages().await), expected);

        let mut stamps = Vec::new();
        for send in sends {
            stamps.push(send.await.unwrap().unwrap().created_at().unwrap());
        }
        assert!(stamps.windows(2).all(|w| w[0] < w[1]));

        let messages = session.stream().messages().await;
        assert_eq!(common::texts(&messages), expected);
        assert!(messages.iter().all(|m| m.state() == &State::Sent));
    }

    #[tokio::test(start_paused = true)]
    async fn voice_message_is_uploaded_on_finish() {
        let f = Fixture::new();
        let session = f.open().await;
        let recorder = session.recorder();

        recorder.start().await.unwrap();
        assert!(recorder.is_recording().await);
        sleep(ms(250)).await;
        let sent = recorder.finish().await.unwrap();

        assert_eq!(sent.kind(), Kind::Audio);
        assert_eq!(sent.state(), &State::Sent);
        assert!(!recorder.is_recording().await);
        assert_eq!(f.microphone.released(), 1);

        let path = BlobPath::media(&THREAD.into(), MediaKind::Audio, sent.id(), "voice.ogg");
        let blob = f.blobs.get(&path).unwrap();
        assert_eq!(blob.content, Bytes::from_static(b"OggSvoice"));
        assert_eq!(blob.content_type, "audio/ogg");
    }

    #[tokio::test(start_paused = true)]
    async fn finish_flushes_chunks_still_buffered() {
        let f = Fixture::new();
        let session = f.open().await;

        session.recorder().start().await.unwrap();
        sleep(ms(50)).await;
        let sent = session.recorder().finish().await.unwrap();

        let path = BlobPath::media(&THREAD.into(), MediaKind::Audio, sent.id(), "voice.ogg");
        assert_eq!(
            f.blobs.get(&path).unwrap().content,
            Bytes::from_static(b"OggSvoice")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn elapsed_ticks_every_second() {
        let f = Fixture::new();
        let session = f.open().await;
        let elapsed = session.recorder().elapsed();

        session.recorder().start().await.unwrap();
        sleep(ms(2100)).await;
        assert_eq!(*elapsed.borrow(), Duration::from_secs(2));

        session.recorder().cancel().await;
    }

    #[tokio::test(start_paused = true)]
    async fn denied_microphone_keeps_the_recorder_idle() {
        let f = Fixture::new();
        let session = f.open().await;
        f.microphone.deny(true);

        let res = session.recorder().start().await;

        assert!(matches!(res, Err(composer::Error::Device(_))));
        assert!(!session.recorder().is_recording().await);
        assert_eq!(f.microphone.opened(), 0);
        assert!(matches!(
            session.recorder().finish().await,
            Err(composer::Error::NotRecording)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn restart_and_cancel_release_the_microphone() {
        let f = Fixture::new();
        let session = f.open().await;
        let recorder = session.recorder();

        recorder.start().await.unwrap();
        recorder.start().await.unwrap();
        assert_eq!(f.microphone.opened(), 2);
        assert_eq!(f.microphone.released(), 1);

        recorder.cancel().await;
        assert_eq!(f.microphone.released(), 2);
        assert!(!recorder.is_recording().await);
        assert_eq!(f.store.message_count(&THREAD.into()), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn silent_recording_is_not_sent() {
        let mut f = Fixture::new();
        let silent = ScriptedMicrophone::new(Vec::new(), "audio/ogg", ms(100));
        f.services.microphone = Arc::new(silent.clone());
        let session = f.open().await;

        session.recorder().start().await.unwrap();
        sleep(ms(300)).await;
        let res = session.recorder().finish().await;

        assert!(matches!(res, Err(composer::Error::EmptyRecording)));
        assert_eq!(silent.released(), 1);
        assert_eq!(f.store.message_count(&THREAD.into()), 0);
    }
}
