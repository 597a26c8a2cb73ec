use clap::{self, Parser};
use reftekio::{
    DecimationSpec, PacketPipeline, PipelineOptions, StreamConfig, TraceSegment, PACKET_LEN,
};

#[derive(clap::Parser)]
struct Cmd {
    /// RT-130 file (a run of 1024-byte packets)
    file: String,
    /// Print a JSON summary of every packet
    #[arg(short, long)]
    summary: bool,
    /// Print the decoded samples of every data packet
    #[arg(short, long)]
    data: bool,
    /// Decimate data packets, e.g. "2,4,5"
    #[arg(long)]
    decimate: Option<String>,
    /// Sample rate of streams whose event header has not been seen
    #[arg(long, default_value_t = 100.0)]
    rate: f64,
}

fn main() -> anyhow::Result<()> {
    let _ = env_logger::builder().try_init();
    let cmd = Cmd::parse();
    let bytes = std::fs::read(&cmd.file)?;

    let options = PipelineOptions {
        decimation: cmd.decimate.as_deref().map(str::parse::<DecimationSpec>).transpose()?,
        ..Default::default()
    };
    let mut pipeline = PacketPipeline::new(options);
    let config = StreamConfig {
        sample_rate: cmd.rate,
        ..Default::default()
    };

    for (i, buf) in bytes.chunks(PACKET_LEN).enumerate() {
        let packet = match pipeline.decode(buf) {
            Ok(p) => p,
            Err(e) => {
                eprintln!("packet {}: {}", i, e);
                continue;
            }
        };
        if cmd.summary {
            println!("{}", packet.summary()?);
        }
        let mut sink: Vec<TraceSegment> = Vec::new();
        pipeline.process_decoded(packet, &config, &mut sink)?;
        if cmd.data {
            for segment in sink {
                println!(
                    "{} {} sps {:?}",
                    segment.meta.start, segment.meta.sample_rate, segment.samples
                );
            }
        }
    }
    Ok(())
}
