use blender::blender::Blender;
use blender::models::{args::Args, border::Border, format::Format, status::Status};
use std::path::PathBuf;

// Render the bottom left quarter of a scene: cargo run --example render -- path/to/scene.blend
async fn render_region() {
    let args = std::env::args().collect::<Vec<String>>();
    let blend_path = match args.get(1) {
        None => PathBuf::from("test.blend"),
        Some(p) => PathBuf::from(p),
    };

    let blender = match Blender::from_executable("blender").await {
        Ok(blender) => blender,
        Err(e) => {
            println!("Blender is not available on PATH! {e}");
            return;
        }
    };
    println!("Found blender {}", blender.version);

    // blender appends the extension for us.
    let output = std::env::temp_dir().join("region_1_1");

    let mut args = Args::new(blend_path, output);
    args.border = Border::new(0.0, 0.5, 0.0, 0.5);
    args.crop = true;
    args.format = Some(Format::PNG);

    let mut listener = match blender.render(&args).await {
        Ok(listener) => listener,
        Err(e) => {
            println!("Unable to start blender! {e}");
            return;
        }
    };

    // Handle blender status
    while let Some(status) = listener.recv().await {
        match status {
            Status::Completed { result } => println!("[Completed] {result:?}"),
            Status::Log { status } => println!("[Info] {status}"),
            Status::Running { status } => println!("[Running] {status}"),
            Status::Warning { message } => println!("[Warning] {message}"),
            Status::Error { message } => println!("[ERROR] {message}"),
            Status::Exit { code } => println!("[Exit] {code:?}"),
        }
    }
}

#[tokio::main]
async fn main() {
    render_region().await;
}
