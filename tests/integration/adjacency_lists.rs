//! Adjacency-list integration tests: compression, full-list reads, staging.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use tempfile::{tempdir, TempDir};

use vesper::lists::{
    AdjLists, InMemList, ListFileWriter, ListsUpdateStore, NodeIdCompression,
};
use vesper::pager::{BufferManager, PagerOptions};
use vesper::types::{ListFileId, NodeId, NodeOffset, Result, TableId, VesperError};
use vesper::Transaction;

fn open_adj(compression: NodeIdCompression) -> Result<(TempDir, AdjLists)> {
    let dir = tempdir()?;
    let buffers = Arc::new(BufferManager::open(
        &dir.path().join("fwd.adj"),
        PagerOptions {
            page_size: 512,
            cache_pages: 16,
        },
    )?);
    let adj = AdjLists::new(
        ListFileId(2),
        buffers,
        compression,
        Arc::new(ListsUpdateStore::new()),
    )?;
    Ok((dir, adj))
}

fn publish_neighbors(adj: &AdjLists, node: NodeOffset, neighbors: &[NodeId]) -> Result<()> {
    let esz = adj.compression().element_size();
    let mut staged = InMemList::new(neighbors.len() as u64, esz, false);
    for (i, id) in neighbors.iter().enumerate() {
        adj.compression().encode(*id, staged.slot_mut(i as u64))?;
    }
    let mut writer = ListFileWriter::begin(adj.lists());
    writer.write_list(node, &staged)?;
    writer.publish()
}

#[test]
fn large_adjacency_list_reads_back_in_full() -> Result<()> {
    let (_dir, adj) = open_adj(NodeIdCompression::new(&[TableId(0)], 1 << 20))?;
    let neighbors: Vec<NodeId> = (0..700u64)
        .map(|i| NodeId {
            table: TableId(0),
            offset: NodeOffset(i * 13 % (1 << 20)),
        })
        .collect();
    publish_neighbors(&adj, NodeOffset(4), &neighbors)?;

    let tx = Transaction::read_only();
    assert_eq!(adj.read_full_adjacency_list(&tx, NodeOffset(4))?, neighbors);
    assert_eq!(adj.num_neighbors(&tx, NodeOffset(4)), 700);
    Ok(())
}

#[test]
fn multi_table_neighbors_keep_their_table_component() -> Result<()> {
    let compression = NodeIdCompression::new(&[TableId(1), TableId(2), TableId(9)], 10_000);
    let (_dir, adj) = open_adj(compression)?;
    let neighbors = vec![
        NodeId {
            table: TableId(9),
            offset: NodeOffset(1234),
        },
        NodeId {
            table: TableId(1),
            offset: NodeOffset(0),
        },
        NodeId {
            table: TableId(2),
            offset: NodeOffset(9999),
        },
    ];
    publish_neighbors(&adj, NodeOffset(0), &neighbors)?;
    assert_eq!(
        adj.read_full_adjacency_list(&Transaction::read_only(), NodeOffset(0))?,
        neighbors
    );
    Ok(())
}

#[test]
fn staged_neighbors_append_after_persistent_ones() -> Result<()> {
    let (_dir, adj) = open_adj(NodeIdCompression::new(&[TableId(0)], 1 << 16))?;
    let persisted = vec![
        NodeId {
            table: TableId(0),
            offset: NodeOffset(10),
        },
        NodeId {
            table: TableId(0),
            offset: NodeOffset(20),
        },
    ];
    publish_neighbors(&adj, NodeOffset(0), &persisted)?;
    let pending = NodeId {
        table: TableId(0),
        offset: NodeOffset(30),
    };
    adj.stage_insertion(NodeOffset(0), pending)?;

    let tx = Transaction::write();
    let mut expected = persisted.clone();
    expected.push(pending);
    assert_eq!(adj.read_full_adjacency_list(&tx, NodeOffset(0))?, expected);
    assert_eq!(
        adj.read_full_adjacency_list(&Transaction::read_only(), NodeOffset(0))?,
        persisted
    );
    Ok(())
}

#[test]
fn unrepresentable_neighbors_never_reach_the_overlay() -> Result<()> {
    let (_dir, adj) = open_adj(NodeIdCompression::new(&[TableId(0)], 1000))?;
    let wide = NodeId {
        table: TableId(0),
        offset: NodeOffset(70_000),
    };
    assert!(matches!(
        adj.stage_insertion(NodeOffset(0), wide),
        Err(VesperError::Invalid(_))
    ));
    let tx = Transaction::write();
    assert_eq!(adj.num_neighbors(&tx, NodeOffset(0)), 0);
    assert_eq!(
        adj.read_full_adjacency_list(&tx, NodeOffset(0))?,
        Vec::<NodeId>::new()
    );
    Ok(())
}

#[test]
fn interrupt_stops_a_full_list_read() -> Result<()> {
    let (_dir, adj) = open_adj(NodeIdCompression::new(&[TableId(0)], 1 << 16))?;
    let neighbors: Vec<NodeId> = (0..700u64)
        .map(|i| NodeId {
            table: TableId(0),
            offset: NodeOffset(i),
        })
        .collect();
    publish_neighbors(&adj, NodeOffset(0), &neighbors)?;

    let tx = Transaction::read_only();
    tx.interrupt_handle().store(true, Ordering::Release);
    assert!(matches!(
        adj.read_full_adjacency_list(&tx, NodeOffset(0)),
        Err(VesperError::Interrupted)
    ));
    Ok(())
}
