//! Update-overlay integration tests: visibility, rebuilds, commit cycles.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use rustc_hash::FxHashMap;
use tempfile::{tempdir, TempDir};

use vesper::lists::{
    DeletionOutcome, InMemList, ListFileWriter, ListHandle, ListSourceStore, ListsUpdateStore,
    RelIdList,
};
use vesper::pager::{BufferManager, PagerOptions};
use vesper::types::{ListFileId, NodeOffset, RelId, Result, VesperError};
use vesper::vector::ValueVector;
use vesper::Transaction;

fn open_rel_ids() -> Result<(TempDir, RelIdList)> {
    let dir = tempdir()?;
    let buffers = Arc::new(BufferManager::open(
        &dir.path().join("fwd.relids"),
        PagerOptions {
            page_size: 512,
            cache_pages: 16,
        },
    )?);
    let rel_ids = RelIdList::new(ListFileId(0), buffers, Arc::new(ListsUpdateStore::new()))?;
    Ok((dir, rel_ids))
}

fn publish_ids(rel_ids: &RelIdList, node: NodeOffset, ids: &[i64]) -> Result<()> {
    let mut staged = InMemList::new(ids.len() as u64, 8, false);
    for (i, id) in ids.iter().enumerate() {
        staged.slot_mut(i as u64).copy_from_slice(&id.to_le_bytes());
    }
    let mut writer = ListFileWriter::begin(rel_ids.lists());
    writer.write_list(node, &staged)?;
    writer.publish()
}

fn scan_selected(rel_ids: &RelIdList, tx: &Transaction, node: NodeOffset) -> Result<Vec<i64>> {
    let mut handle = ListHandle::new();
    rel_ids.init_scan(tx, node, &mut handle);
    let mut vector = ValueVector::new(8);
    let mut out = Vec::new();
    while rel_ids.read_next(tx, &mut handle, &mut vector)? {
        for pos in vector.selected() {
            out.push(vector.get_i64(pos)?);
        }
    }
    Ok(out)
}

#[test]
fn overlay_is_served_after_the_persistent_store() -> Result<()> {
    let (_dir, rel_ids) = open_rel_ids()?;
    let node = NodeOffset(0);
    publish_ids(&rel_ids, node, &[1, 2])?;
    rel_ids.stage_insertion(node, RelId(3));
    rel_ids.stage_insertion(node, RelId(4));

    let tx = Transaction::write();
    let mut handle = ListHandle::new();
    rel_ids.init_scan(&tx, node, &mut handle);
    let mut vector = ValueVector::new(8);

    assert!(rel_ids.read_next(&tx, &mut handle, &mut vector)?);
    assert_eq!(handle.source(), ListSourceStore::Persistent);
    assert!(rel_ids.read_next(&tx, &mut handle, &mut vector)?);
    assert_eq!(handle.source(), ListSourceStore::Update);
    assert_eq!(vector.get_i64(0)?, 3);
    assert_eq!(vector.get_i64(1)?, 4);
    assert!(!rel_ids.read_next(&tx, &mut handle, &mut vector)?);

    // Uncommitted insertions stay invisible to read-only transactions.
    assert_eq!(
        scan_selected(&rel_ids, &Transaction::read_only(), node)?,
        vec![1, 2]
    );
    Ok(())
}

#[test]
fn commit_cycle_applies_deletions_and_insertions() -> Result<()> {
    let (_dir, rel_ids) = open_rel_ids()?;
    let node = NodeOffset(0);
    publish_ids(&rel_ids, node, &[10, 11, 12, 13])?;
    rel_ids.stage_deletion(node, RelId(11));
    rel_ids.stage_insertion(node, RelId(99));

    // Before commit, the writing transaction already observes the final
    // shape while readers still see the published version.
    let tx = Transaction::write();
    assert_eq!(scan_selected(&rel_ids, &tx, node)?, vec![10, 12, 13, 99]);
    assert_eq!(
        scan_selected(&rel_ids, &Transaction::read_only(), node)?,
        vec![10, 11, 12, 13]
    );

    // Commit: map deleted identifiers to offsets, fold the overlay into a
    // new published snapshot, then drain it.
    let deleted = rel_ids.deleted_offsets_for_node(&tx, node)?;
    assert_eq!(deleted, vec![1]);
    let mut deleted_by_node = FxHashMap::default();
    deleted_by_node.insert(node, deleted);
    rel_ids.lists().commit(&tx, &deleted_by_node, None)?;
    rel_ids.lists().update_store().drain();

    assert_eq!(
        scan_selected(&rel_ids, &Transaction::read_only(), node)?,
        vec![10, 12, 13, 99]
    );
    Ok(())
}

#[test]
fn deleting_an_uncommitted_insertion_never_marks_the_persistent_store() -> Result<()> {
    let (_dir, rel_ids) = open_rel_ids()?;
    let node = NodeOffset(0);
    publish_ids(&rel_ids, node, &[50])?;
    rel_ids.stage_insertion(node, RelId(77));

    assert_eq!(
        rel_ids.stage_deletion(node, RelId(77)),
        DeletionOutcome::RemovedPendingInsertion(0)
    );
    let store = rel_ids.lists().update_store();
    assert_eq!(store.num_deleted(rel_ids.lists().file_id(), node), 0);
    assert_eq!(store.num_inserted(rel_ids.lists().file_id(), node), 0);

    // Deleting a persisted identifier takes the other path.
    assert_eq!(
        rel_ids.stage_deletion(node, RelId(50)),
        DeletionOutcome::MarkedDeletedInPersistentStore
    );
    assert_eq!(
        scan_selected(&rel_ids, &Transaction::write(), node)?,
        Vec::<i64>::new()
    );
    Ok(())
}

#[test]
fn rollback_discards_the_overlay() -> Result<()> {
    let (_dir, rel_ids) = open_rel_ids()?;
    let node = NodeOffset(3);
    publish_ids(&rel_ids, node, &[7, 8])?;
    rel_ids.stage_insertion(node, RelId(9));
    rel_ids.stage_deletion(node, RelId(7));

    rel_ids.lists().update_store().drain();
    assert_eq!(scan_selected(&rel_ids, &Transaction::write(), node)?, vec![7, 8]);
    Ok(())
}

#[test]
fn growth_past_the_small_capacity_reclassifies_the_list() -> Result<()> {
    let (_dir, rel_ids) = open_rel_ids()?;
    let node = NodeOffset(0);
    let ids: Vec<i64> = (0..510).collect();
    publish_ids(&rel_ids, node, &ids)?;
    for i in 510..515i64 {
        rel_ids.stage_insertion(node, RelId(i));
    }

    let tx = Transaction::write();
    let rebuilt = rel_ids.lists().rebuild_list_for_write(&tx, node, &[], None)?;
    assert_eq!(rebuilt.num_elements(), 515);
    let mut writer = ListFileWriter::begin(rel_ids.lists());
    writer.write_list(node, &rebuilt)?;
    writer.publish()?;
    rel_ids.lists().update_store().drain();

    let read_tx = Transaction::read_only();
    let mut handle = ListHandle::new();
    rel_ids.init_scan(&read_tx, node, &mut handle);
    assert!(handle.header().is_large());
    assert_eq!(
        scan_selected(&rel_ids, &read_tx, node)?,
        (0..515).collect::<Vec<i64>>()
    );
    Ok(())
}

#[test]
fn interrupt_aborts_a_rebuild_mid_flight() -> Result<()> {
    let (_dir, rel_ids) = open_rel_ids()?;
    let node = NodeOffset(0);
    publish_ids(&rel_ids, node, &(0..600).collect::<Vec<i64>>())?;

    let tx = Transaction::write();
    tx.interrupt_handle().store(true, Ordering::Release);
    assert!(matches!(
        rel_ids.lists().rebuild_list_for_write(&tx, node, &[], None),
        Err(VesperError::Interrupted)
    ));
    Ok(())
}

#[test]
fn newly_added_nodes_read_only_from_the_overlay() -> Result<()> {
    let (_dir, rel_ids) = open_rel_ids()?;
    let node = NodeOffset(5);
    let store = rel_ids.lists().update_store();
    store.mark_newly_added_node(rel_ids.lists().file_id(), node);
    rel_ids.stage_insertion(node, RelId(1));

    let tx = Transaction::write();
    assert_eq!(rel_ids.lists().num_persistent_elements(&tx, node), 0);
    assert_eq!(scan_selected(&rel_ids, &tx, node)?, vec![1]);

    let staged = rel_ids.lists().rebuild_from_update_store_only(node, None)?;
    let mut writer = ListFileWriter::begin(rel_ids.lists());
    writer.write_list(node, &staged)?;
    writer.publish()?;
    store.drain();
    assert_eq!(scan_selected(&rel_ids, &Transaction::read_only(), node)?, vec![1]);
    Ok(())
}
