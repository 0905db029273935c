#[tokio::main]
async fn main() {
    if let Err(e) = httptrace::app::run::main_with_error().await {
        eprintln!("{:#}", e);
        std::process::exit(1);
    }
}
