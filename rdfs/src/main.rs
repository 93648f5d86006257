use std::num::{NonZeroU16, NonZeroU64};
use std::path::{Path, PathBuf};

use anyhow::{Context, bail};
use clap::{Args, Parser, Subcommand};
use rdfs::client::{ClientOptions, Session};
use rdfs::cluster::{MiniCluster, Storage};
use rdfs::meta::{FileStatus, LocatedFileStatus};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "rdfs")]
#[command(about = "A minimal distributed filesystem running as an in-process cluster", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Walk through mkdir/put/get/rename/list/delete using ./rdfs demo <dir>")]
    Demo {
        #[arg(value_name = "DIR")]
        dir: PathBuf,
    },
    #[command(about = "Read commands from stdin and run them against one session")]
    Shell(ShellArgs),
}

#[derive(Args)]
struct ShellArgs {
    /// Root directory for data node storage.
    #[arg(long, value_name = "DIR")]
    data_dir: PathBuf,
    #[arg(long, default_value_t = 3)]
    datanodes: usize,
    /// Client-side replication override.
    #[arg(long)]
    replication: Option<NonZeroU16>,
    /// Client-side block size override, in bytes.
    #[arg(long)]
    block_size: Option<NonZeroU64>,
    #[arg(long, default_value = "atguigu")]
    user: String,
    /// Print listings as JSON.
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("rdfs=info")),
        )
        .with_writer(std::io::stderr)
        .init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Demo { dir } => demo(&dir).await,
        Commands::Shell(args) => shell(args).await,
    }
}

async fn demo(dir: &Path) -> anyhow::Result<()> {
    let cluster = MiniCluster::builder()
        .storage(Storage::LocalDir(dir.join("data")))
        .block_size(NonZeroU64::new(16).context("block size")?)
        .build()?;
    let options = ClientOptions::new().replication(NonZeroU16::new(2).context("replication")?);
    let mut fs = Session::connect_to(&cluster, "hdfs://hadoop102:8020", "atguigu", options).await?;

    fs.mkdirs("/xiyou/huaguoshan").await?;

    let input = dir.join("input");
    tokio::fs::create_dir_all(&input).await?;
    let local = input.join("wordcount.txt");
    tokio::fs::write(&local, "atguigu atguigu\nss ss\ncls cls\njiao\nbanzhang\nxue\nhadoop\n").await?;

    let report = fs
        .copy_from_local(&local, "/xiyou/huaguoshan/wordcount.txt", false, true)
        .await?;
    println!("put {} ({} bytes, {} blocks)", report.path, report.bytes, report.blocks);
    for warning in &report.warnings {
        println!("warning: {warning}");
    }

    let got = fs
        .copy_to_local(
            "/xiyou/huaguoshan/wordcount.txt",
            dir.join("output").join("wordcount.txt"),
            false,
            true,
        )
        .await?;
    println!("get {} ({} bytes)", got.local.display(), got.bytes);

    fs.rename(
        "/xiyou/huaguoshan/wordcount.txt",
        "/xiyou/huaguoshan/wordcount1.txt",
        false,
    )
    .await?;

    for status in fs.list_files_recursive("/")? {
        print_located(&status);
    }
    for status in fs.list_status("/").await? {
        let kind = if status.is_file() { "file" } else { "dir" };
        println!("{kind}: {}", status.name());
    }

    fs.delete("/xiyou", true).await?;
    fs.close();
    println!("demo: OK");
    Ok(())
}

async fn shell(args: ShellArgs) -> anyhow::Result<()> {
    let cluster = MiniCluster::builder()
        .datanodes(args.datanodes)
        .storage(Storage::LocalDir(args.data_dir.clone()))
        .build()?;
    let mut options = ClientOptions::new();
    options.replication = args.replication;
    options.block_size = args.block_size;
    let mut session = cluster.session(&args.user, options).await?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let words: Vec<&str> = line.split_whitespace().collect();
        if words.is_empty() || words[0].starts_with('#') {
            continue;
        }
        if matches!(words[0], "quit" | "exit") {
            break;
        }
        if let Err(e) = run_command(&mut session, &words, args.json).await {
            eprintln!("{}: {e:#}", words[0]);
        }
    }
    session.close();
    Ok(())
}

async fn run_command(session: &mut Session, words: &[&str], json: bool) -> anyhow::Result<()> {
    match words {
        ["mkdir", path] => {
            session.mkdirs(path).await?;
        }
        ["put", local, remote] => put(session, local, remote, false).await?,
        ["put", "-f", local, remote] => put(session, local, remote, true).await?,
        ["get", remote, local] => {
            let got = session.copy_to_local(remote, local, false, true).await?;
            println!("{} bytes -> {}", got.bytes, got.local.display());
        }
        ["rm", path] => session.delete(path, false).await?,
        ["rm", "-r", path] => session.delete(path, true).await?,
        ["mv", src, dst] => session.rename(src, dst, false).await?,
        ["ls"] | ["ls", _] => {
            let path = words.get(1).copied().unwrap_or("/");
            let entries = session.list_status(path).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&entries)?);
            } else {
                entries.iter().for_each(print_status);
            }
        }
        ["lsr"] | ["lsr", _] => {
            let path = words.get(1).copied().unwrap_or("/");
            let files: Vec<LocatedFileStatus> = session.list_files_recursive(path)?.collect();
            if json {
                println!("{}", serde_json::to_string_pretty(&files)?);
            } else {
                files.iter().for_each(print_located);
            }
        }
        ["stat", path] => {
            let status = session.stat(path).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&status)?);
            } else {
                print_status(&status);
            }
        }
        ["help"] => {
            println!("mkdir P | put [-f] LOCAL REMOTE | get REMOTE LOCAL | rm [-r] P");
            println!("mv SRC DST | ls [P] | lsr [P] | stat P | quit");
        }
        _ => bail!("unrecognized command, try `help`"),
    }
    Ok(())
}

async fn put(session: &mut Session, local: &str, remote: &str, overwrite: bool) -> anyhow::Result<()> {
    let report = session
        .copy_from_local(local, remote, false, overwrite)
        .await
        .with_context(|| format!("uploading {local}"))?;
    println!("{} bytes -> {} ({} blocks)", report.bytes, report.path, report.blocks);
    for warning in &report.warnings {
        println!("warning: {warning}");
    }
    Ok(())
}

fn print_status(status: &FileStatus) {
    let (kind, replication) = if status.is_dir() {
        ('d', "-".to_string())
    } else {
        ('-', status.replication.to_string())
    };
    println!(
        "{kind}{} {:>3} {} {} {:>10} {} {}",
        status.permission,
        replication,
        status.owner,
        status.group,
        status.length,
        status.modification_time,
        status.path
    );
}

fn print_located(located: &LocatedFileStatus) {
    let status = &located.status;
    println!("============= {} =============", status.path);
    println!("permission: {}", status.permission);
    println!("owner: {}", status.owner);
    println!("group: {}", status.group);
    println!("length: {}", status.length);
    println!("modification time: {}", status.modification_time);
    println!("replication: {}", status.replication);
    println!("block size: {}", status.block_size);
    println!("access time: {}", status.access_time);
    println!("name: {}", status.name());
    for block in &located.blocks {
        let hosts: Vec<&str> = block.hosts.iter().map(|h| h.as_str()).collect();
        println!(
            "block {}: offset {} length {} hosts [{}]",
            block.block,
            block.offset,
            block.length,
            hosts.join(", ")
        );
    }
}
