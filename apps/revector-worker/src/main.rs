use clap::Parser;

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
	color_eyre::install()?;
	let args = revector_worker::Args::parse();
	revector_worker::run(args).await
}
