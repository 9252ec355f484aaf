//! Property-list integration tests: fixed-width values, strings, nested
//! lists, overflow resolution.

use std::sync::Arc;

use tempfile::{tempdir, TempDir};

use vesper::lists::{
    ListFileWriter, ListHandle, ListPropertyLists, ListsUpdateStore, PropertyLists,
    StringPropertyLists,
};
use vesper::overflow::{DiskOverflowFile, OVF_REF_LEN};
use vesper::pager::{BufferManager, PagerOptions};
use vesper::types::{ListFileId, NodeOffset, Result};
use vesper::vector::ValueVector;
use vesper::Transaction;

const PAGE: PagerOptions = PagerOptions {
    page_size: 512,
    cache_pages: 16,
};

fn open_strings() -> Result<(TempDir, StringPropertyLists)> {
    let dir = tempdir()?;
    let list_buffers = Arc::new(BufferManager::open(&dir.path().join("name.lists"), PAGE)?);
    let ovf_buffers = Arc::new(BufferManager::open(&dir.path().join("name.ovf"), PAGE)?);
    let strings = StringPropertyLists::new(
        ListFileId(3),
        list_buffers,
        Arc::new(DiskOverflowFile::new(ovf_buffers)),
        Arc::new(ListsUpdateStore::new()),
    )?;
    Ok((dir, strings))
}

#[test]
fn fixed_width_property_values_round_trip_with_nulls() -> Result<()> {
    let dir = tempdir()?;
    let buffers = Arc::new(BufferManager::open(&dir.path().join("since.lists"), PAGE)?);
    let props = PropertyLists::new(
        ListFileId(4),
        buffers,
        8,
        Arc::new(ListsUpdateStore::new()),
    )?;
    let node = NodeOffset(0);
    for i in 0..10i64 {
        props.stage_insertion(node, i.to_le_bytes().to_vec(), i % 3 == 0);
    }
    let staged = props.lists().rebuild_from_update_store_only(node, None)?;
    let mut writer = ListFileWriter::begin(props.lists());
    writer.write_list(node, &staged)?;
    writer.publish()?;
    props.lists().update_store().drain();

    let tx = Transaction::read_only();
    let mut handle = ListHandle::new();
    props.init_scan(&tx, node, &mut handle);
    let mut vector = ValueVector::new(8);
    assert!(props.read_next(&tx, &mut handle, &mut vector)?);
    assert_eq!(vector.original_size(), 10);
    for pos in 0..10 {
        assert_eq!(vector.is_null(pos), pos % 3 == 0);
        if !vector.is_null(pos) {
            assert_eq!(vector.get_i64(pos)?, pos as i64);
        }
    }
    Ok(())
}

#[test]
fn committed_strings_resolve_through_the_overflow_store() -> Result<()> {
    let (_dir, strings) = open_strings()?;
    let node = NodeOffset(2);
    // A payload longer than a page forces a multi-page overflow entry.
    let long = "x".repeat(1300);
    strings.stage_insertion(node, "alpha");
    strings.stage_null(node);
    strings.stage_insertion(node, &long);

    let staged = strings
        .lists()
        .rebuild_from_update_store_only(node, Some(strings.overflow()))?;
    let mut writer = ListFileWriter::begin(strings.lists());
    writer.write_list(node, &staged)?;
    writer.publish()?;
    strings.lists().update_store().drain();

    let tx = Transaction::read_only();
    let mut handle = ListHandle::new();
    strings.init_scan(&tx, node, &mut handle);
    let mut vector = ValueVector::new(OVF_REF_LEN);
    assert!(strings.read_next(&tx, &mut handle, &mut vector)?);
    assert_eq!(vector.original_size(), 3);
    assert_eq!(vector.aux(0), Some(b"alpha".as_ref()));
    assert!(vector.is_null(1));
    assert_eq!(vector.aux(2), Some(long.as_bytes()));
    Ok(())
}

#[test]
fn mixed_persistent_and_overlay_strings_scan_in_order() -> Result<()> {
    let (_dir, strings) = open_strings()?;
    let node = NodeOffset(0);
    strings.stage_insertion(node, "committed");
    let staged = strings
        .lists()
        .rebuild_from_update_store_only(node, Some(strings.overflow()))?;
    let mut writer = ListFileWriter::begin(strings.lists());
    writer.write_list(node, &staged)?;
    writer.publish()?;
    strings.lists().update_store().drain();

    strings.stage_insertion(node, "pending");
    let tx = Transaction::write();
    let mut handle = ListHandle::new();
    strings.init_scan(&tx, node, &mut handle);
    let mut vector = ValueVector::new(OVF_REF_LEN);
    let mut seen = Vec::new();
    while strings.read_next(&tx, &mut handle, &mut vector)? {
        for pos in 0..vector.original_size() {
            seen.push(vector.aux(pos).unwrap().to_vec());
        }
    }
    assert_eq!(seen, vec![b"committed".to_vec(), b"pending".to_vec()]);
    Ok(())
}

#[test]
fn nested_list_payloads_round_trip_packed() -> Result<()> {
    let dir = tempdir()?;
    let list_buffers = Arc::new(BufferManager::open(&dir.path().join("scores.lists"), PAGE)?);
    let ovf_buffers = Arc::new(BufferManager::open(&dir.path().join("scores.ovf"), PAGE)?);
    let nested = ListPropertyLists::new(
        ListFileId(5),
        list_buffers,
        Arc::new(DiskOverflowFile::new(ovf_buffers)),
        Arc::new(ListsUpdateStore::new()),
    )?;
    let node = NodeOffset(0);
    let child: Vec<u8> = [3i64, 1, 4, 1, 5]
        .iter()
        .flat_map(|v| v.to_le_bytes())
        .collect();
    nested.stage_insertion(node, child.clone());

    let staged = nested
        .lists()
        .rebuild_from_update_store_only(node, Some(nested.overflow()))?;
    let mut writer = ListFileWriter::begin(nested.lists());
    writer.write_list(node, &staged)?;
    writer.publish()?;
    nested.lists().update_store().drain();

    let tx = Transaction::read_only();
    let mut handle = ListHandle::new();
    nested.init_scan(&tx, node, &mut handle);
    let mut vector = ValueVector::new(OVF_REF_LEN);
    assert!(nested.read_next(&tx, &mut handle, &mut vector)?);
    assert_eq!(vector.aux(0), Some(child.as_slice()));
    Ok(())
}
