use clap::Parser;

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
	color_eyre::install()?;
	let args = revector_api::Args::parse();
	revector_api::run(args).await
}
