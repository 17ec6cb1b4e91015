// Huly™ © 2025 Huly Labs • https://hulylabs.com • SPDX-License-Identifier: MIT
//
// console.rs:

use anyhow::{anyhow, bail, Result};
use clap::Parser;
use colored::*;
use mpointer::{connection, BlockId, MPointer, MemoryClient};
use rustyline::{error::ReadlineError, DefaultEditor};

#[derive(Parser, Debug)]
struct Args {
    #[clap(subcommand)]
    command: Command,
}

#[derive(Parser, Debug)]
enum Command {
    /// Interactive session against a memory manager
    Console { server: String },
    /// Two i32 pointers written and read back
    Demo { server: String },
}

fn id(arg: Option<&str>) -> Result<BlockId> {
    let arg = arg.ok_or_else(|| anyhow!("missing block id"))?;
    Ok(BlockId::new(arg.parse()?))
}

fn execute(client: &MemoryClient, line: &str) -> Result<String> {
    let mut words = line.split_whitespace();
    let command = words.next().unwrap_or_default();
    let result = match command {
        "create" => {
            let size: u32 = words
                .next()
                .ok_or_else(|| anyhow!("usage: create <size> <type>"))?
                .parse()?;
            let type_tag = words.collect::<Vec<_>>().join(" ");
            if type_tag.is_empty() {
                bail!("usage: create <size> <type>");
            }
            format!("id {}", client.create(size, &type_tag)?)
        }
        "set" => {
            let id = id(words.next())?;
            // values may contain spaces, e.g. a single ' ' char
            let value = line
                .trim_start()
                .splitn(3, char::is_whitespace)
                .nth(2)
                .ok_or_else(|| anyhow!("usage: set <id> <value>"))?;
            client.set(id, value)?;
            "stored".to_string()
        }
        "get" => client.get(id(words.next())?)?,
        "inc" => format!("refs {}", client.increase_ref_count(id(words.next())?)?),
        "dec" => format!("refs {}", client.decrease_ref_count(id(words.next())?)?),
        other => bail!("unknown command `{other}`"),
    };
    Ok(result)
}

fn console(server: &str) -> Result<()> {
    let client = MemoryClient::connect(server)?;
    println!("{} connected to {}", "mpointer".bold(), server.underline());
    println!(
        "Commands: create <size> <type>, set <id> <value>, get <id>, inc <id>, dec <id>"
    );
    println!("Type {} or press Ctrl+D to exit\n", ":quit".red().bold());

    let mut rl = DefaultEditor::new()?;
    loop {
        match rl.readline("mpointer ❯ ") {
            Ok(line) => {
                if line.trim().is_empty() {
                    continue;
                }
                rl.add_history_entry(line.as_str())?;
                if line.trim() == ":quit" {
                    break;
                }
                match execute(&client, &line) {
                    Ok(result) => println!("{}:  {}", "OK".green(), result),
                    Err(err) => eprintln!("{}: {}", "ERR".red().bold(), err),
                }
            }
            Err(ReadlineError::Interrupted) => {
                println!("CTRL-C");
                continue;
            }
            Err(ReadlineError::Eof) => {
                println!("CTRL-D");
                break;
            }
            Err(err) => {
                println!("Error: {:?}", err);
                break;
            }
        }
    }
    Ok(())
}

fn demo(server: &str) -> Result<()> {
    connection::init(server)?;
    {
        let first = MPointer::<i32>::new()?;
        let second = MPointer::<i32>::new()?;
        first.write(1234)?;
        second.write(12345)?;
        println!("{} = {}", first.address(), first.read()?);
        println!("{} = {}", second.address(), second.read()?);
    }
    connection::shutdown();
    Ok(())
}

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();
    match Args::parse().command {
        Command::Console { server } => console(&server),
        Command::Demo { server } => demo(&server),
    }
}
