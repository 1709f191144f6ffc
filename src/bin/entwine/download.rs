use std::path::PathBuf;

use tracing::{info, warn};

use entwine::adapters::StoreSource;
use entwine::ipfs::IpfsClient;
use entwine::model::Metadata;
use entwine::prelude::*;

use crate::feedback::Feedback;

#[derive(Debug, clap::Args)]
pub struct Args {
    /// Root identifier of the file
    pub root_cid: String,

    /// Output path
    pub output: PathBuf,

    /// Metadata envelope identifier enabling repair
    #[arg(short = 'm', long)]
    pub metadata: Option<String>,

    /// Keep repaired blocks local instead of re-uploading them
    #[arg(long)]
    pub no_reupload: bool,

    /// Simulate loss of the listed data blocks
    #[arg(long, value_delimiter = ',')]
    pub missing_data: Vec<BlockIndex>,

    /// Simulate loss of parity blocks on the horizontal strand
    #[arg(long, value_delimiter = ',')]
    pub missing_horizontal: Vec<BlockIndex>,

    /// Simulate loss of parity blocks on the right helix
    #[arg(long, value_delimiter = ',')]
    pub missing_right: Vec<BlockIndex>,

    /// Simulate loss of parity blocks on the left helix
    #[arg(long, value_delimiter = ',')]
    pub missing_left: Vec<BlockIndex>,

    /// Hops the sequential recovery phase explores before going parallel
    #[arg(long, default_value_t = lattice::DEFAULT_SWITCH_DEPTH)]
    pub switch_depth: usize,
}

pub async fn run(config: &crate::Config, args: &Args) -> Result<(), Error> {
    let client = IpfsClient::new(&config.ipfs.api_url);

    let Some(meta_cid) = &args.metadata else {
        client.get_file(&args.root_cid, &args.output).await?;
        info!(path = %args.output.display(), "finished downloading file (no repair)");
        return Ok(());
    };

    let metadata = Metadata::from_json(&client.cat(meta_cid).await?)?;
    let params = metadata.params()?;
    let len = metadata.len();
    let index_to_cid = metadata.index_to_cid();

    let source = FilteredSource::new(StoreSource::from_metadata(client.clone(), &metadata))
        .without_data(args.missing_data.iter().copied())
        .without_parity(Strand::Horizontal, args.missing_horizontal.iter().copied())
        .without_parity(Strand::Right, args.missing_right.iter().copied())
        .without_parity(Strand::Left, args.missing_left.iter().copied());

    let lattice = Lattice::new(params, len, source)?.with_switch_depth(args.switch_depth);

    let feedback = Feedback::default();
    let progress = feedback.block_progress_bar(len as u64);
    progress.set_message("recovering");

    let mut file = Vec::new();
    let mut repaired_any = false;

    for index in 1..=len as BlockIndex {
        let chunk = lattice.get_chunk(index).await?;

        if chunk.repaired {
            repaired_any = true;

            if !args.no_reupload {
                let expected = index_to_cid.get(&index).cloned().unwrap_or_default();
                let actual = client.block_put(chunk.bytes.clone()).await?;
                if actual != expected {
                    return Err(Error::ReuploadMismatch {
                        index,
                        expected,
                        actual,
                    });
                }
                info!(index, cid = %actual, "repaired block re-uploaded");
            } else {
                warn!(index, "block repaired locally, store copy still missing");
            }
        }

        file.extend_from_slice(&chunk.bytes);
        progress.inc(1);
    }

    progress.finish_and_clear();
    std::fs::write(&args.output, file)?;

    if repaired_any {
        info!(path = %args.output.display(), "finished downloading file (repair)");
    } else {
        info!(path = %args.output.display(), "finished downloading file (no repair)");
    }

    Ok(())
}
