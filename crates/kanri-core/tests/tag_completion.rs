use std::sync::Arc;
use std::time::Duration;

use kanri_core::app::App;
use kanri_core::gateway::{CommandGateway, MemoryGateway};
use kanri_core::tag_completion::placement::{FieldKind, InputField, Rect, Viewport};
use kanri_core::tag_completion::{CompletionState, Key, TagDetected, TextEdit};
use parking_lot::Mutex;

async fn app_with_tags(names: &[&str]) -> (Arc<MemoryGateway>, App) {
    let gateway = Arc::new(MemoryGateway::new());
    let app = App::load(gateway.clone() as Arc<dyn CommandGateway>)
        .await
        .expect("load app");
    for name in names {
        app.tags.create_tag(name, None).await.expect("create tag");
    }
    (gateway, app)
}

fn names(tags: &[kanri_shared::Tag]) -> Vec<String> {
    tags.iter().map(|t| t.name.clone()).collect()
}

#[tokio::test]
async fn keyboard_navigation_wraps_and_escape_closes() {
    let (_gateway, app) = app_with_tags(&["oatmilk", "milk", "mint", "oats"]).await;
    let completion = app.tag_completion();

    let token = completion
        .check_for_tag_input("buy #mi", 7)
        .expect("active token");
    assert_eq!((token.start, token.end), (4, 7));
    assert_eq!(token.content, "mi");
    assert_eq!(names(&completion.suggestions()), vec!["milk", "mint", "oatmilk"]);
    assert_eq!(completion.highlighted().expect("first").name, "milk");

    assert!(completion.on_key(Key::Down));
    assert_eq!(completion.highlighted().expect("second").name, "mint");
    assert!(completion.on_key(Key::Up));
    assert!(completion.on_key(Key::Up));
    assert_eq!(completion.highlighted().expect("wrapped").name, "oatmilk");
    assert!(!completion.on_key(Key::Other));

    assert!(completion.on_key(Key::Escape));
    assert_eq!(completion.state(), CompletionState::Idle);
    assert!(!completion.on_key(Key::Down));
}

#[tokio::test]
async fn moving_the_caret_off_the_token_hides_suggestions() {
    let (_gateway, app) = app_with_tags(&["milk"]).await;
    let completion = app.tag_completion();

    assert!(completion.check_for_tag_input("buy #mi now", 6).is_some());
    assert!(completion.is_active());
    assert!(completion.check_for_tag_input("buy #mi now", 9).is_none());
    assert!(!completion.is_active());
    assert!(completion.check_for_tag_input("buy #", 5).is_none());
}

#[tokio::test]
async fn suggestion_list_is_capped() {
    let (_gateway, app) = app_with_tags(&["a1", "a2", "a3", "b1"]).await;
    let completion = app.tag_completion().with_limit(2);

    completion.check_for_tag_input("#a", 2).expect("token");
    assert_eq!(names(&completion.suggestions()), vec!["a1", "a2"]);
}

#[tokio::test]
async fn selecting_a_suggestion_rewrites_the_text_and_reports_it() {
    let (_gateway, app) = app_with_tags(&["milk"]).await;
    let detected: Arc<Mutex<Vec<TagDetected>>> = Arc::default();
    let sink = Arc::clone(&detected);
    let completion = app
        .tag_completion()
        .on_detect(move |event| sink.lock().push(event));

    let text = "buy #mi and more";
    completion.check_for_tag_input(text, 7).expect("token");
    let tag = completion.highlighted().expect("suggestion");
    let edit = completion.select_suggestion(text, &tag).expect("edit");

    assert_eq!(
        edit,
        TextEdit {
            text: "buy #milk and more".to_string(),
            caret: 10,
        }
    );
    assert!(!completion.is_active());
    assert_eq!(
        *detected.lock(),
        vec![TagDetected {
            tag_name: "milk".to_string(),
            position: 4,
        }]
    );
}

#[tokio::test]
async fn create_new_tag_reuses_an_existing_name() {
    let (gateway, app) = app_with_tags(&["camp"]).await;
    let completion = app.tag_completion();

    completion.check_for_tag_input("pack #tent", 10).expect("token");
    let edit = completion.create_new_tag("pack #tent").await.expect("edit");
    assert_eq!(edit.text, "pack #tent ");
    assert_eq!(edit.caret, 11);
    assert_eq!(names(&app.tags.tags()), vec!["camp", "tent"]);

    gateway.clear_calls();
    completion.check_for_tag_input("#camp", 5).expect("token");
    let edit = completion.create_new_tag("#camp").await.expect("edit");
    assert_eq!(edit.text, "#camp ");
    assert_eq!(app.tags.tags().len(), 2);
    assert!(gateway.calls().is_empty());
}

#[tokio::test]
async fn blur_hides_after_the_grace_period_unless_input_resumes() {
    let (_gateway, app) = app_with_tags(&["milk"]).await;
    let completion = app
        .tag_completion()
        .with_blur_grace(Duration::from_millis(40));

    completion.check_for_tag_input("#mi", 3).expect("token");
    let ((), ()) = tokio::join!(completion.on_blur(), async {
        tokio::time::sleep(Duration::from_millis(5)).await;
        completion.check_for_tag_input("#mil", 4);
    });
    assert!(completion.is_active());
    assert_eq!(completion.active_token().expect("token").content, "mil");

    completion.on_blur().await;
    assert!(!completion.is_active());
}

#[tokio::test]
async fn panel_is_placed_under_the_token() {
    let (_gateway, app) = app_with_tags(&["milk"]).await;
    let completion = app.tag_completion();
    let field = InputField {
        kind: FieldKind::SingleLine,
        rect: Rect {
            x: 10.0,
            y: 20.0,
            width: 400.0,
            height: 30.0,
        },
        char_width: 8.0,
        line_height: 18.0,
        padding: 4.0,
        scroll_left: 0.0,
        scroll_top: 0.0,
    };
    let viewport = Viewport {
        width: 1024.0,
        height: 768.0,
    };

    assert!(completion.place(&field, "buy #mi", viewport).is_none());
    completion.check_for_tag_input("buy #mi", 7).expect("token");
    let placement = completion
        .place(&field, "buy #mi", viewport)
        .expect("placement");
    assert!(!placement.above);
    assert!(placement.x >= field.rect.x);
    assert!(placement.y >= field.rect.y + field.rect.height);
    match completion.state() {
        CompletionState::Active { placement: stored, .. } => {
            assert_eq!(stored, Some(placement));
        }
        CompletionState::Idle => panic!("completion should be active"),
    }
}
