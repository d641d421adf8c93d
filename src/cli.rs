//! Interface de linha de comando do tooltip-ocr baseada em clap.
//!
//! Define a struct [`Cli`] com subcomandos [`Command`] (run, config)
//! e flags globais que sobrescrevem `tooltip-ocr.toml` e o ambiente.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// tooltip-ocr: extrai o texto de tooltips de itens a partir de screenshots.
#[derive(Debug, Parser)]
#[command(name = "tooltip-ocr", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Caminho alternativo para o arquivo de configuração.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Número de workers paralelos (1 a 10).
    #[arg(long, short = 'w', global = true)]
    pub workers: Option<usize>,

    /// Orçamento de requisições por minuto.
    #[arg(long, global = true)]
    pub rpm: Option<u32>,

    /// Número máximo de retentativas em caso de falha de rede.
    #[arg(long, global = true)]
    pub max_retries: Option<u32>,

    /// Timeout de cada chamada ao modelo, em segundos.
    #[arg(long, global = true)]
    pub timeout: Option<u64>,

    /// Habilita saída detalhada (verbose).
    #[arg(long, short, global = true, default_value_t = false)]
    pub verbose: bool,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Processa todas as imagens de uma pasta.
    Run {
        /// Pasta com os screenshots (.png, .jpg, .jpeg).
        folder: PathBuf,

        /// Arquivo ou diretório de saída. Padrão: `<pasta>/output.txt`.
        #[arg(long, short)]
        output: Option<PathBuf>,
    },

    /// Mostra a configuração efetiva, com a chave da API mascarada.
    Config,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_parses_run_subcommand() {
        let cli = Cli::parse_from(["tooltip-ocr", "run", "shots"]);
        match cli.command {
            Command::Run { folder, output } => {
                assert_eq!(folder, PathBuf::from("shots"));
                assert!(output.is_none());
            }
            _ => panic!("expected Run command"),
        }
    }

    #[test]
    fn cli_parses_output_flag() {
        let cli = Cli::parse_from(["tooltip-ocr", "run", "shots", "-o", "items.txt"]);
        match cli.command {
            Command::Run { output, .. } => {
                assert_eq!(output, Some(PathBuf::from("items.txt")));
            }
            _ => panic!("expected Run command"),
        }
    }

    #[test]
    fn cli_parses_global_flags() {
        let cli = Cli::parse_from([
            "tooltip-ocr",
            "--workers",
            "4",
            "--rpm",
            "60",
            "--max-retries",
            "5",
            "--timeout",
            "30",
            "--verbose",
            "config",
        ]);
        assert!(cli.verbose);
        assert!(matches!(cli.command, Command::Config));
        assert_eq!(cli.workers, Some(4));
        assert_eq!(cli.rpm, Some(60));
        assert_eq!(cli.max_retries, Some(5));
        assert_eq!(cli.timeout, Some(30));
    }

    #[test]
    fn global_flags_accepted_after_subcommand() {
        let cli = Cli::parse_from(["tooltip-ocr", "run", "shots", "-w", "2"]);
        assert_eq!(cli.workers, Some(2));
        assert!(cli.config.is_none());
    }

    #[test]
    fn cli_verify() {
        Cli::command().debug_assert();
    }
}
