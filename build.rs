//! Renders `osclink(1)` and one page per subcommand from the clap definition.

use std::{fs, path::Path};

use clap::CommandFactory;
use clap_mangen::Man;

#[path = "src/cli.rs"]
mod cli;

const MAN_DIR: &str = "target/man";

fn render(command: clap::Command, file: &Path) -> std::io::Result<()> {
    let mut page = Vec::new();
    Man::new(command).render(&mut page)?;
    fs::write(file, page)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("cargo:rerun-if-changed=src/cli.rs");

    let dir = Path::new(MAN_DIR);
    fs::create_dir_all(dir)?;

    let command = cli::Cli::command();
    for sub in command.get_subcommands() {
        let name = format!("osclink-{}", sub.get_name());
        render(sub.clone().display_name(name.clone()), &dir.join(format!("{name}.1")))?;
    }
    render(command, &dir.join("osclink.1"))?;
    Ok(())
}
