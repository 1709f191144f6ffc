use std::collections::HashMap;
use std::path::PathBuf;

use tokio::sync::mpsc;
use tracing::info;

use entwine::dag::MerkleNode;
use entwine::ipfs::IpfsClient;
use entwine::model::{Cid, Metadata};
use entwine::prelude::*;

use crate::feedback::Feedback;

#[derive(Debug, clap::Args)]
pub struct Args {
    /// File to upload
    pub path: PathBuf,

    /// Entanglement alpha; 0 uploads without entanglement
    #[arg(short = 'a', long, default_value_t = 0)]
    pub alpha: usize,

    /// Horizontal chain period
    #[arg(short, long, default_value_t = 0)]
    pub s: usize,

    /// Helical chain period
    #[arg(short, long, default_value_t = 0)]
    pub p: usize,

    /// Move internal DAG nodes out of their children's lattice window
    #[arg(long)]
    pub swap: bool,
}

pub async fn run(config: &crate::Config, args: &Args) -> Result<(), Error> {
    let client = IpfsClient::new(&config.ipfs.api_url);
    let feedback = Feedback::default();

    let root = client.add_file(&args.path).await?;
    info!(%root, path = %args.path.display(), "file added to the store");

    if args.alpha == 0 {
        println!("file CID: {root}");
        return Ok(());
    }

    let params = EntanglementParams::new(args.alpha, args.s, args.p)?;

    let tree = MerkleNode::load(&client, &root).await?;
    let nodes = tree.flattened(args.s, args.p, args.swap);
    let len = nodes.len();
    info!(blocks = len, "lattice order settled");

    let mut data_cid_index = HashMap::with_capacity(len);
    for (offset, node) in nodes.iter().enumerate() {
        data_cid_index.insert(node.cid.clone(), offset as BlockIndex + 1);
    }

    let (block_tx, block_rx) = mpsc::channel(16);
    let (parity_tx, mut parity_rx) = mpsc::channel(16);
    let driver = tokio::spawn(Entangler::run(params, block_rx, parity_tx));

    let feeder = {
        let blocks: Vec<BlockData> = nodes.iter().map(|node| node.bytes.clone()).collect();
        tokio::spawn(async move {
            for block in blocks {
                if block_tx.send(block).await.is_err() {
                    break;
                }
            }
        })
    };

    let progress = feedback.block_progress_bar((params.alpha * len) as u64);
    progress.set_message("storing parities");

    let mut parity_cids = vec![vec![Cid::new(); len]; params.alpha];
    while let Some(parity) = parity_rx.recv().await {
        let cid = client.block_put(parity.bytes).await?;
        parity_cids[parity.strand.index()][parity.left as usize - 1] = cid;
        progress.inc(1);
    }

    feeder.await.map_err(Error::client)?;
    let entangled = driver.await.map_err(Error::client)??;
    progress.finish_and_clear();
    info!(blocks = entangled, "entanglement stored");

    let metadata = Metadata {
        alpha: args.alpha,
        s: args.s,
        p: args.p,
        root_cid: root.clone(),
        data_cid_index,
        parity_cids,
    };
    let meta_cid = client.add_bytes(metadata.to_json()?).await?;

    if let Some(cluster) = &config.cluster {
        let (cluster, replication) = crate::common::cluster_client(cluster);
        cluster.pin(&root, replication).await?;
        cluster.pin(&meta_cid, replication).await?;
    }

    println!("file CID: {root}");
    println!("metadata CID: {meta_cid}");
    Ok(())
}
