#[actix_web::main]
async fn main() {
    if let Err(err) = zenit_tracker_lib::run().await {
        eprintln!("zenit-tracker: {err}");
        std::process::exit(1);
    }
}
