use clap::Parser;

fn main() {
    let cli = wayplanctl::Cli::parse();
    if let Err(err) = wayplanctl::run(cli) {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}
