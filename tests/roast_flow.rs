use crux_core::testing::AppTester;

use roastme_core::capabilities::{MediaError, MediaHandle, MediaOperation, MediaOutput, PickedFile};
use roastme_core::roast::{self, ServiceOutcome};
use roastme_core::{encoder, App, AppState, Effect, ErrorKind, Event, Model, MAX_IMAGE_BYTES};

fn picked(name: &str, media_type: &str, size_bytes: u64, handle: &str) -> PickedFile {
    PickedFile {
        handle: MediaHandle::new(handle),
        name: name.into(),
        media_type: media_type.into(),
        size_bytes,
    }
}

fn started() -> (AppTester<App, Effect>, Model) {
    let app = AppTester::<App, Effect>::default();
    let mut model = Model::default();
    app.update(
        Event::AppStarted {
            api_key: Some("test-key".into()),
        },
        &mut model,
    );
    assert_eq!(model.state, AppState::Idle);
    (app, model)
}

/// Run a batch of events through the app, collecting every effect they emit.
fn feed(app: &AppTester<App, Effect>, model: &mut Model, events: Vec<Event>) -> Vec<Effect> {
    let mut effects = Vec::new();
    for event in events {
        effects.extend(app.update(event, model).effects);
    }
    effects
}

/// Drive the pick flow to completion for `file`, returning the effects emitted
/// while handling the pick response (preview request, renders, releases).
fn select(app: &AppTester<App, Effect>, model: &mut Model, file: PickedFile) -> Vec<Effect> {
    let mut update = app.update(Event::SelectImageRequested, model);
    let request = update
        .effects
        .iter_mut()
        .find_map(|effect| match effect {
            Effect::Media(request) => Some(request),
            _ => None,
        })
        .expect("expected a media pick effect");
    assert!(matches!(request.operation, MediaOperation::Pick { .. }));

    let update = app
        .resolve(request, Ok(MediaOutput::Picked(file)))
        .expect("resolve pick");
    feed(app, model, update.events)
}

fn release_urls(effects: &[Effect]) -> Vec<String> {
    effects
        .iter()
        .filter_map(|effect| match effect {
            Effect::Media(request) => match &request.operation {
                MediaOperation::ReleasePreview { url } => Some(url.clone()),
                _ => None,
            },
            _ => None,
        })
        .collect()
}

fn media_effect_count(effects: &[Effect]) -> usize {
    effects
        .iter()
        .filter(|effect| matches!(effect, Effect::Media(_)))
        .count()
}

fn service_text_response(text: &str) -> ServiceOutcome {
    ServiceOutcome::Response {
        status: 200,
        body: serde_json::json!({
            "candidates": [{
                "content": { "parts": [{ "text": text }] },
                "finishReason": "STOP"
            }]
        })
        .to_string()
        .into_bytes(),
    }
}

#[test]
fn test_missing_credential_is_fatal() {
    let app = AppTester::<App, Effect>::default();
    let mut model = Model::default();

    app.update(Event::AppStarted { api_key: None }, &mut model);
    assert_eq!(model.state, AppState::ConfigError);
    assert_eq!(model.error.as_ref().unwrap().kind, ErrorKind::Configuration);

    // Every user action is inert from here on: no effects, no state change.
    for event in [
        Event::SelectImageRequested,
        Event::RoastRequested,
        Event::ResetRequested,
    ] {
        let update = app.update(event, &mut model);
        assert!(update.effects.is_empty());
        assert_eq!(model.state, AppState::ConfigError);
    }
}

#[test]
fn test_blank_credential_is_fatal() {
    let app = AppTester::<App, Effect>::default();
    let mut model = Model::default();

    app.update(
        Event::AppStarted {
            api_key: Some("   ".into()),
        },
        &mut model,
    );
    assert_eq!(model.state, AppState::ConfigError);
}

#[test]
fn test_select_then_roast_happy_path() {
    let (app, mut model) = started();

    select(&app, &mut model, picked("me.png", "image/png", 4096, "f1"));
    assert_eq!(model.state, AppState::ImageSelected);
    assert!(model.roast.is_none());
    assert!(model.error.is_none());

    // Request the roast: the file is read back first.
    let mut update = app.update(Event::RoastRequested, &mut model);
    assert_eq!(model.state, AppState::Loading);
    let read_request = update
        .effects
        .iter_mut()
        .find_map(|effect| match effect {
            Effect::Media(request)
                if matches!(request.operation, MediaOperation::Read { .. }) =>
            {
                Some(request)
            }
            _ => None,
        })
        .expect("expected a media read effect");

    let bytes = b"fake png bytes".to_vec();
    let update = app
        .resolve(read_request, Ok(MediaOutput::Data { bytes: bytes.clone() }))
        .expect("resolve read");
    let effects = feed(&app, &mut model, update.events);

    // One HTTP request, carrying the fixed endpoint and the encoded payload,
    // with the credential kept out of the URL.
    let http_request = effects
        .iter()
        .find_map(|effect| match effect {
            Effect::Http(request) => Some(request),
            _ => None,
        })
        .expect("expected an http effect");
    assert_eq!(http_request.operation.method, "POST");
    assert!(http_request.operation.url.ends_with(":generateContent"));
    assert!(!http_request.operation.url.contains("test-key"));

    let body = String::from_utf8_lossy(&http_request.operation.body);
    let expected_payload = encoder::encode(&bytes, "image/png");
    assert!(body.contains(&expected_payload.data));
    assert!(body.contains("Roast this image."));

    // Still loading until the service answers.
    assert_eq!(model.state, AppState::Loading);

    app.update(
        Event::RoastResponse(service_text_response("Bold of that shirt to be seen in public.")),
        &mut model,
    );
    assert_eq!(model.state, AppState::ImageSelected);
    assert_eq!(
        model.roast.as_deref(),
        Some("Bold of that shirt to be seen in public.")
    );
    assert!(model.error.is_none());
    assert!(model.result_state_consistent());
}

#[test]
fn test_service_refusal_is_displayed_in_persona() {
    let (app, mut model) = started();
    select(&app, &mut model, picked("me.png", "image/png", 4096, "f1"));
    model.state = AppState::Loading;

    let outcome = ServiceOutcome::Response {
        status: 200,
        body: serde_json::json!({
            "candidates": [{ "content": { "parts": [] }, "finishReason": "SAFETY" }]
        })
        .to_string()
        .into_bytes(),
    };
    app.update(Event::RoastResponse(outcome), &mut model);

    assert_eq!(model.roast.as_deref(), Some(roast::SAFETY_FALLBACK));
    assert!(model.error.is_none());
    assert_eq!(model.state, AppState::ImageSelected);
}

#[test]
fn test_roast_requested_twice_is_single_flight() {
    let (app, mut model) = started();
    select(&app, &mut model, picked("me.png", "image/png", 4096, "f1"));

    let update = app.update(Event::RoastRequested, &mut model);
    assert!(update.effects.iter().any(|e| matches!(e, Effect::Media(_))));
    assert_eq!(model.state, AppState::Loading);

    // A second request while loading emits nothing at all.
    let update = app.update(Event::RoastRequested, &mut model);
    assert!(update.effects.is_empty());
    assert_eq!(model.state, AppState::Loading);
    assert!(model.result_state_consistent());
}

#[test]
fn test_read_failure_surfaces_error_without_network() {
    let (app, mut model) = started();
    select(&app, &mut model, picked("me.png", "image/png", 4096, "f1"));

    let mut update = app.update(Event::RoastRequested, &mut model);
    let read_request = update
        .effects
        .iter_mut()
        .find_map(|effect| match effect {
            Effect::Media(request)
                if matches!(request.operation, MediaOperation::Read { .. }) =>
            {
                Some(request)
            }
            _ => None,
        })
        .expect("expected a media read effect");

    let update = app
        .resolve(
            read_request,
            Err(MediaError::ReadFailed {
                reason: "file vanished".into(),
            }),
        )
        .expect("resolve read");
    let effects = feed(&app, &mut model, update.events);

    assert!(!effects.iter().any(|e| matches!(e, Effect::Http(_))));
    assert_eq!(model.state, AppState::ImageSelected);
    assert_eq!(model.error.as_ref().unwrap().kind, ErrorKind::Read);
    assert!(model.roast.is_none());
    assert!(model.result_state_consistent());
}

#[test]
fn test_validation_failure_keeps_previous_selection() {
    let (app, mut model) = started();
    select(&app, &mut model, picked("ok.png", "image/png", 4096, "f1"));

    let effects = select(
        &app,
        &mut model,
        picked("huge.png", "image/png", MAX_IMAGE_BYTES as u64 + 1, "f2"),
    );

    assert_eq!(model.error.as_ref().unwrap().kind, ErrorKind::ImageTooLarge);
    let selected = model.selected.as_ref().unwrap();
    assert_eq!(selected.handle.as_str(), "f1");
    // The surviving selection's preview is untouched: no release, no new
    // preview request.
    assert_eq!(media_effect_count(&effects), 0);
}

#[test]
fn test_non_image_pick_sets_validation_error() {
    let (app, mut model) = started();

    let effects = select(&app, &mut model, picked("notes.txt", "text/plain", 64, "f1"));

    assert_eq!(
        model.error.as_ref().unwrap().kind,
        ErrorKind::ImageTypeUnsupported
    );
    assert!(model.selected.is_none());
    assert_eq!(model.state, AppState::Idle);
    assert_eq!(media_effect_count(&effects), 0);
}

#[test]
fn test_cancelled_pick_changes_nothing() {
    let (app, mut model) = started();

    let mut update = app.update(Event::SelectImageRequested, &mut model);
    let request = update
        .effects
        .iter_mut()
        .find_map(|effect| match effect {
            Effect::Media(request) => Some(request),
            _ => None,
        })
        .expect("expected a media pick effect");

    let update = app
        .resolve(request, Ok(MediaOutput::Cancelled))
        .expect("resolve pick");
    feed(&app, &mut model, update.events);

    assert!(model.selected.is_none());
    assert!(model.error.is_none());
    assert_eq!(model.state, AppState::Idle);
}

#[test]
fn test_preview_released_once_on_replace_and_reset() {
    let (app, mut model) = started();

    // First selection gets its preview attached.
    let mut effects = select(&app, &mut model, picked("a.png", "image/png", 100, "fa"));
    let preview_request = effects
        .iter_mut()
        .find_map(|effect| match effect {
            Effect::Media(request)
                if matches!(request.operation, MediaOperation::CreatePreview { .. }) =>
            {
                Some(request)
            }
            _ => None,
        })
        .expect("expected a preview effect");
    let update = app
        .resolve(
            preview_request,
            Ok(MediaOutput::Preview {
                handle: MediaHandle::new("fa"),
                url: "blob:a".into(),
            }),
        )
        .expect("resolve preview");
    feed(&app, &mut model, update.events);
    assert_eq!(
        model.selected.as_ref().unwrap().preview_url.as_deref(),
        Some("blob:a")
    );

    // Replacing the photo releases the old preview exactly once.
    let effects = select(&app, &mut model, picked("b.png", "image/png", 100, "fb"));
    assert_eq!(release_urls(&effects), vec!["blob:a".to_string()]);

    // Attach the second preview, then reset: released exactly once.
    let mut effects = effects;
    let preview_request = effects
        .iter_mut()
        .find_map(|effect| match effect {
            Effect::Media(request)
                if matches!(request.operation, MediaOperation::CreatePreview { .. }) =>
            {
                Some(request)
            }
            _ => None,
        })
        .expect("expected a preview effect");
    let update = app
        .resolve(
            preview_request,
            Ok(MediaOutput::Preview {
                handle: MediaHandle::new("fb"),
                url: "blob:b".into(),
            }),
        )
        .expect("resolve preview");
    feed(&app, &mut model, update.events);

    let update = app.update(Event::ResetRequested, &mut model);
    assert_eq!(release_urls(&update.effects), vec!["blob:b".to_string()]);
    assert_eq!(model.state, AppState::Idle);
    assert!(model.selected.is_none());
    assert!(model.roast.is_none());
    assert!(model.error.is_none());

    // A second reset has nothing left to release.
    let update = app.update(Event::ResetRequested, &mut model);
    assert_eq!(media_effect_count(&update.effects), 0);
}

#[test]
fn test_preview_arriving_after_reset_is_released() {
    let (app, mut model) = started();

    let mut effects = select(&app, &mut model, picked("a.png", "image/png", 100, "fa"));
    app.update(Event::ResetRequested, &mut model);
    assert!(model.selected.is_none());

    // The preview request from the abandoned selection resolves late; the
    // orphaned URL must be released immediately.
    let preview_request = effects
        .iter_mut()
        .find_map(|effect| match effect {
            Effect::Media(request)
                if matches!(request.operation, MediaOperation::CreatePreview { .. }) =>
            {
                Some(request)
            }
            _ => None,
        })
        .expect("expected a preview effect");
    let update = app
        .resolve(
            preview_request,
            Ok(MediaOutput::Preview {
                handle: MediaHandle::new("fa"),
                url: "blob:a".into(),
            }),
        )
        .expect("resolve preview");
    let effects = feed(&app, &mut model, update.events);

    assert_eq!(release_urls(&effects), vec!["blob:a".to_string()]);
    assert!(model.selected.is_none());
}

#[test]
fn test_roast_response_after_reset_is_discarded() {
    let (app, mut model) = started();
    select(&app, &mut model, picked("me.png", "image/png", 4096, "f1"));
    app.update(Event::RoastRequested, &mut model);
    assert_eq!(model.state, AppState::Loading);

    app.update(Event::ResetRequested, &mut model);
    assert_eq!(model.state, AppState::Idle);

    app.update(
        Event::RoastResponse(service_text_response("too late")),
        &mut model,
    );
    assert!(model.roast.is_none());
    assert_eq!(model.state, AppState::Idle);
    assert!(model.result_state_consistent());
}

#[test]
fn test_new_roast_clears_previous_result() {
    let (app, mut model) = started();
    select(&app, &mut model, picked("me.png", "image/png", 4096, "f1"));

    model.state = AppState::Loading;
    app.update(
        Event::RoastResponse(service_text_response("First burn.")),
        &mut model,
    );
    assert_eq!(model.roast.as_deref(), Some("First burn."));

    // Requesting again clears the old roast while the new one is in flight.
    app.update(Event::RoastRequested, &mut model);
    assert_eq!(model.state, AppState::Loading);
    assert!(model.roast.is_none());
    assert!(model.error.is_none());
}
