use super::*;
use crate::test_support::{recording, uuid, RecordingSink, RecordingTransport};
use std::{collections::HashSet, time::Duration};

const UPLOAD_URL: &str = "http://files.test/upload";
const PHOTO: CategoryId = CategoryId(1);
const ATTACHMENTS: CategoryId = CategoryId(2);
const SLIDES: CategoryId = CategoryId(3);

fn categories() -> Vec<FileType> {
    vec![
        FileType::new(PHOTO, "Photo").with_extensions(["jpg", "png"]),
        FileType::new(ATTACHMENTS, "Attachments")
            .allow_multiple(true)
            .with_file(uuid(100), "agenda.pdf"),
        FileType::new(SLIDES, "Slides")
            .with_extensions([".PDF"])
            .with_template("*_slides.pdf"),
    ]
}

fn manager(
    transport: Arc<RecordingTransport>,
    sink: Arc<RecordingSink>,
) -> FileManager {
    FileManager::with_transport(categories(), UPLOAD_URL, transport, sink)
}

fn file(name: &str) -> PendingFile {
    PendingFile::new(name, name.as_bytes().to_vec())
}

fn photo_files(manager: &FileManager) -> Vec<FileEntry> {
    manager
        .snapshot()
        .file_type(PHOTO)
        .expect("photo category")
        .files
        .clone()
}

#[tokio::test]
async fn replacing_single_file_deletes_previous_upload() {
    let (transport, sink) = recording();
    let manager = manager(transport.clone(), sink);

    let first = manager
        .drop_files(PHOTO, vec![file("a.jpg")])
        .await
        .expect("drop a.jpg");
    let u1 = first.results[0].as_ref().expect("a.jpg uploaded").uuid;
    assert_eq!(u1, uuid(1));

    let files = photo_files(&manager);
    assert_eq!(files.len(), 1);
    assert_eq!(files[0].filename, "a.jpg");
    assert_eq!(files[0].state, Some(FileState::Added));
    assert_eq!(files[0].uuid, u1);

    let second = manager
        .drop_files(PHOTO, vec![file("b.png")])
        .await
        .expect("drop b.png");
    let u2 = second.results[0].as_ref().expect("b.png uploaded").uuid;

    assert_eq!(transport.deleted(), vec![u1]);
    let files = photo_files(&manager);
    assert_eq!(files.len(), 1);
    assert_eq!(files[0].filename, "b.png");
    assert_eq!(files[0].state, Some(FileState::Modified));
    assert_eq!(files[0].uuid, u2);
    assert_eq!(transport.upload_urls(), vec![UPLOAD_URL, UPLOAD_URL]);
}

#[tokio::test]
async fn failed_replacement_keeps_original_and_skips_delete() {
    let transport = Arc::new(RecordingTransport::new().failing_on("b.png"));
    let sink = Arc::new(RecordingSink::default());
    let manager = manager(transport.clone(), sink);

    manager
        .drop_files(PHOTO, vec![file("a.jpg")])
        .await
        .expect("drop a.jpg");
    let before = photo_files(&manager);

    let outcome = manager
        .drop_files(PHOTO, vec![file("b.png")])
        .await
        .expect("drop b.png");

    assert_eq!(outcome.results, vec![None]);
    assert_eq!(photo_files(&manager), before);
    assert!(transport.deleted().is_empty());

    let state = manager.snapshot();
    let failed: Vec<_> = state.uploads_for(PHOTO).collect();
    assert_eq!(failed.len(), 1);
    assert!(!failed[0].is_active());
    assert!(!manager.is_uploading());
    assert_eq!(manager.validation_error(), None);
}

#[tokio::test]
async fn replacing_a_saved_file_leaves_server_copy_alone() {
    let (transport, sink) = recording();
    let initial = vec![FileType::new(PHOTO, "Photo").with_file(uuid(500), "portrait.jpg")];
    let manager = FileManager::with_transport(initial, UPLOAD_URL, transport.clone(), sink);

    manager
        .drop_files(PHOTO, vec![file("new.jpg")])
        .await
        .expect("drop");

    assert!(transport.deleted().is_empty());
    let files = photo_files(&manager);
    assert_eq!(files.len(), 1);
    assert_eq!(files[0].filename, "new.jpg");
    assert_eq!(files[0].state, Some(FileState::Modified));
}

#[tokio::test]
async fn concurrent_multi_file_uploads_all_land_as_added() {
    let transport = Arc::new(
        RecordingTransport::new()
            .delayed("one.pdf", Duration::from_millis(60))
            .delayed("two.pdf", Duration::from_millis(30)),
    );
    let sink = Arc::new(RecordingSink::default());
    let manager = manager(transport, sink);

    let outcome = manager
        .drop_files(
            ATTACHMENTS,
            vec![file("one.pdf"), file("two.pdf"), file("three.pdf")],
        )
        .await
        .expect("drop");

    let returned: Vec<_> = outcome
        .results
        .iter()
        .map(|r| r.as_ref().expect("uploaded").filename.as_str())
        .collect();
    assert_eq!(returned, ["one.pdf", "two.pdf", "three.pdf"]);

    let state = manager.snapshot();
    let attachments = state.file_type(ATTACHMENTS).expect("category");
    let added: Vec<_> = attachments
        .files
        .iter()
        .filter(|f| f.state == Some(FileState::Added))
        .collect();
    assert_eq!(added.len(), 3);
    let distinct: HashSet<_> = added.iter().map(|f| f.uuid).collect();
    assert_eq!(distinct.len(), 3);
    assert_eq!(attachments.files.len(), 4);
    assert!(!manager.is_uploading());
}

#[tokio::test]
async fn template_mismatch_is_recorded_once_per_attempt() {
    let (transport, sink) = recording();
    let manager = manager(transport.clone(), sink);

    let outcome = manager
        .drop_files(SLIDES, vec![file("notes.pdf")])
        .await
        .expect("drop");
    assert_eq!(outcome.invalid, vec!["notes.pdf".to_string()]);
    assert!(outcome.results.is_empty());

    let state = manager.snapshot();
    let slides = state.file_type(SLIDES).expect("category");
    assert_eq!(slides.invalid_files, ["notes.pdf"]);
    assert!(slides.files.is_empty());
    assert!(transport.upload_urls().is_empty());
    assert!(manager
        .validation_error()
        .expect("validation error")
        .contains("Slides"));

    manager
        .drop_files(SLIDES, vec![file("notes.pdf"), file("Talk_Slides.PDF")])
        .await
        .expect("second drop");
    let state = manager.snapshot();
    let slides = state.file_type(SLIDES).expect("category");
    assert_eq!(slides.invalid_files, ["notes.pdf", "notes.pdf"]);
    assert_eq!(slides.files.len(), 1);
    assert_eq!(slides.files[0].filename, "Talk_Slides.PDF");

    manager.dismiss_invalid(SLIDES);
    manager.settle().await.expect("settle");
    assert_eq!(manager.validation_error(), None);
}

#[tokio::test]
async fn disallowed_extension_is_rejected_without_upload() {
    let (transport, sink) = recording();
    let manager = manager(transport.clone(), sink);

    let outcome = manager
        .drop_files(PHOTO, vec![file("anim.gif")])
        .await
        .expect("drop");

    assert_eq!(outcome.rejected, vec!["anim.gif".to_string()]);
    assert!(outcome.invalid.is_empty());
    assert!(transport.upload_urls().is_empty());
    assert!(photo_files(&manager).is_empty());
}

#[tokio::test]
async fn single_file_category_uploads_only_first_file() {
    let (transport, sink) = recording();
    let manager = manager(transport.clone(), sink);

    let outcome = manager
        .drop_files(PHOTO, vec![file("a.jpg"), file("b.jpg")])
        .await
        .expect("drop");

    assert_eq!(outcome.results.len(), 1);
    assert_eq!(outcome.rejected, vec!["b.jpg".to_string()]);
    assert_eq!(photo_files(&manager).len(), 1);
}

#[tokio::test]
async fn dirty_changes_reach_the_form_once() {
    let (transport, sink) = recording();
    let manager = manager(transport, sink.clone());

    manager
        .drop_files(PHOTO, vec![file("a.jpg")])
        .await
        .expect("drop");

    let values = sink.values();
    assert_eq!(values.len(), 1);
    assert_eq!(values[0].files, vec![uuid(1), uuid(100)]);
    assert_eq!(values[0].by_category[&PHOTO], vec![uuid(1)]);
    assert!(!values[0].uploading);
    assert_eq!(values[0].error, None);
    assert!(!manager.snapshot().is_dirty());
    assert_eq!(manager.field_value().files, values[0].files);
}

#[tokio::test]
async fn returning_to_pristine_deletes_unsaved_uploads_and_resets() {
    let (transport, sink) = recording();
    let manager = manager(transport.clone(), sink);

    manager
        .drop_files(PHOTO, vec![file("a.jpg")])
        .await
        .expect("photo");
    manager
        .drop_files(ATTACHMENTS, vec![file("x.pdf"), file("y.pdf")])
        .await
        .expect("attachments");
    manager
        .drop_files(SLIDES, vec![file("bad.pdf")])
        .await
        .expect("slides");

    assert!(!manager.set_pristine(false).await.expect("dirty form"));
    assert!(manager.set_pristine(true).await.expect("pristine form"));

    let deleted: HashSet<_> = transport.deleted().into_iter().collect();
    assert_eq!(transport.deleted().len(), 3);
    assert_eq!(deleted, HashSet::from([uuid(1), uuid(2), uuid(3)]));
    assert!(!deleted.contains(&uuid(100)));

    let state = manager.snapshot();
    assert_eq!(state.file_types(), categories().as_slice());
    assert!(!state.is_dirty());
    assert_eq!(state.uploads().count(), 0);

    assert!(!manager.set_pristine(true).await.expect("still pristine"));
    assert_eq!(transport.deleted().len(), 3);
}

#[tokio::test]
async fn upload_finishing_after_reset_is_discarded() {
    let transport = Arc::new(
        RecordingTransport::new().delayed("late.jpg", Duration::from_millis(150)),
    );
    let sink = Arc::new(RecordingSink::default());
    let manager = manager(transport.clone(), sink);

    let background = manager.clone();
    let pending = tokio::spawn(async move {
        background
            .drop_files(PHOTO, vec![file("late.jpg")])
            .await
            .expect("drop")
    });
    manager
        .wait_until(|state| state.uploads().count() == 1)
        .await
        .expect("upload started");

    manager.set_pristine(false).await.expect("dirty");
    manager.set_pristine(true).await.expect("reset");

    let outcome = pending.await.expect("join");
    assert_eq!(outcome.results, vec![None]);
    assert_eq!(transport.deleted(), vec![uuid(1)]);
    assert!(photo_files(&manager).is_empty());
    assert_eq!(manager.snapshot().uploads().count(), 0);
}

#[tokio::test]
async fn removing_files_deletes_only_session_uploads() {
    let (transport, sink) = recording();
    let manager = manager(transport.clone(), sink);

    manager
        .drop_files(ATTACHMENTS, vec![file("x.pdf")])
        .await
        .expect("drop");

    let saved = manager
        .remove_file(ATTACHMENTS, uuid(100))
        .await
        .expect("remove saved");
    assert_eq!(saved.state, Some(FileState::Deleted));
    assert!(transport.deleted().is_empty());

    manager
        .remove_file(ATTACHMENTS, uuid(1))
        .await
        .expect("remove upload");
    assert_eq!(transport.deleted(), vec![uuid(1)]);
    assert!(manager.field_value().files.is_empty());

    let missing = manager.remove_file(ATTACHMENTS, uuid(1)).await;
    assert!(matches!(missing, Err(FileManagerError::UnknownFile { .. })));
}

#[tokio::test]
async fn unknown_category_is_an_error() {
    let (transport, sink) = recording();
    let manager = manager(transport, sink);

    let result = manager.drop_files(CategoryId(77), vec![file("a.jpg")]).await;
    assert!(matches!(
        result,
        Err(FileManagerError::UnknownCategory(CategoryId(77)))
    ));
}
