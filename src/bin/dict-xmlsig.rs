use std::io::{Read, Write};
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use dict_xmlsig::{Document, XmlSigner};

/// Sign a directory service request with an enveloped XML signature.
#[derive(Debug, Parser)]
#[command(version)]
struct Cli {
    /// The PKCS#12 store holding the signing key and its certificate.
    #[arg(long, env = "DICT_SIGNATURE_KEYSTORE")]
    keystore: PathBuf,

    /// The password protecting the PKCS#12 store.
    #[arg(long, env = "DICT_SIGNATURE_KEYSTORE_PASSWORD", hide_env_values = true)]
    keystore_password: String,

    /// The XML document to sign, or "-" to read it from stdin.
    #[arg(default_value = "-")]
    input: PathBuf,

    /// Where to write the signed document. Defaults to stdout.
    #[arg(long, short)]
    output: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    pretty_env_logger::init();
    let opts = Cli::parse();

    let signer = XmlSigner::from_pkcs12_file(&opts.keystore, &opts.keystore_password)
        .context("failed to load the signing identity")?;

    let mut source = Vec::new();
    if opts.input.as_os_str() == "-" {
        std::io::stdin()
            .read_to_end(&mut source)
            .context("failed to read the document from stdin")?;
    } else {
        source = std::fs::read(&opts.input)
            .with_context(|| format!("failed to read {}", opts.input.display()))?;
    }

    let mut document =
        Document::from_reader(source.as_slice()).context("failed to parse the document")?;
    signer
        .sign(&mut document)
        .context("failed to sign the document")?;

    match &opts.output {
        Some(path) => {
            let file = std::fs::File::create(path)
                .with_context(|| format!("failed to create {}", path.display()))?;
            let mut file = std::io::BufWriter::new(file);
            document
                .write_to(&mut file)
                .with_context(|| format!("failed to write {}", path.display()))?;
            file.flush()
                .with_context(|| format!("failed to write {}", path.display()))?;
        }
        None => {
            let stdout = std::io::stdout();
            let mut stdout = stdout.lock();
            document
                .write_to(&mut stdout)
                .context("failed to write the signed document")?;
            stdout.flush().context("failed to write the signed document")?;
        }
    }

    Ok(())
}
