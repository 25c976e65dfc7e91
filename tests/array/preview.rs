use std::io::{Cursor, Read};

use medtwin::{
    array::ImageArray,
    preview::{
        MAX_PREVIEW_IMAGES, PreviewError, build_preview_archive, preview_entry_name,
        render_previews, store_preview_archive, write_previews_to_prefix,
    },
    storage::MemoryBlobStore,
};
use ndarray::{ArrayD, IxDyn};

use crate::support::ramp_batch;

fn png_dimensions(body: &[u8]) -> (u32, u32) {
    let decoder = png::Decoder::new(Cursor::new(body));
    let reader = decoder.read_info().expect("png header should decode");
    let info = reader.info();
    (info.width, info.height)
}

#[tokio::test]
async fn given_hundred_images_when_written_to_prefix_then_exactly_cap_objects() {
    let store = MemoryBlobStore::default();
    let data = ImageArray::F32(ramp_batch(100, 3, 5));

    let count = write_previews_to_prefix(&store, &data, "work/run_a/processed_png/")
        .await
        .expect("previews should be written");

    assert_eq!(count, MAX_PREVIEW_IMAGES);
    let mut keys = store.keys_with_prefix("work/run_a/processed_png/").await;
    keys.sort();
    assert_eq!(keys.len(), 32);
    assert_eq!(keys.first().map(String::as_str), Some("work/run_a/processed_png/0000.png"));
    assert_eq!(keys.last().map(String::as_str), Some("work/run_a/processed_png/0031.png"));

    let first = store
        .object("work/run_a/processed_png/0000.png")
        .await
        .expect("first preview should exist");
    assert_eq!(first.content_type, "image/png");
    assert_eq!(png_dimensions(&first.body), (5, 3));
}

#[tokio::test]
async fn given_hundred_images_when_archived_then_zip_holds_cap_entries_as_attachment() {
    let store = MemoryBlobStore::default();
    let data = ImageArray::F32(ramp_batch(100, 4, 4));

    let archive =
        build_preview_archive(&data, "run_a_preproc.zip").expect("archive should build");
    assert_eq!(archive.entry_count, 32);

    let mut zip = zip::ZipArchive::new(Cursor::new(archive.bytes.clone()))
        .expect("archive should be a zip");
    assert_eq!(zip.len(), 32);
    let mut names: Vec<String> = zip.file_names().map(str::to_string).collect();
    names.sort();
    assert_eq!(names[0], "0000.png");
    assert_eq!(names[31], "0031.png");

    let mut entry = zip.by_name("0007.png").expect("entry should exist");
    let mut body = Vec::new();
    entry.read_to_end(&mut body).expect("entry should read");
    assert_eq!(png_dimensions(&body), (4, 4));

    store_preview_archive(&store, archive, "work/run_a/processed_preproc.zip")
        .await
        .expect("archive should be stored");
    let stored = store
        .object("work/run_a/processed_preproc.zip")
        .await
        .expect("archive should exist");
    assert_eq!(stored.content_type, "application/zip");
    assert_eq!(
        stored.content_disposition.as_deref(),
        Some("attachment; filename=\"run_a_preproc.zip\"")
    );
}

#[test]
fn given_single_image_when_rendered_then_one_preview() {
    let image = ImageArray::U8(ArrayD::from_shape_fn(IxDyn(&[6, 2]), |index| index[0] as u8));

    let rendered = render_previews(&image).expect("render should succeed");

    assert_eq!(rendered.len(), 1);
    assert_eq!(png_dimensions(&rendered[0]), (2, 6));
}

#[test]
fn given_rank_four_when_rendered_then_rank_error() {
    let data = ImageArray::F32(ArrayD::zeros(IxDyn(&[1, 2, 3, 3])));

    let err = render_previews(&data).expect_err("render should fail");

    assert!(matches!(err, PreviewError::Rank(_)));
}

#[test]
fn entry_names_are_zero_padded() {
    assert_eq!(preview_entry_name(0), "0000.png");
    assert_eq!(preview_entry_name(31), "0031.png");
}
