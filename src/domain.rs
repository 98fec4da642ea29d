use std::fmt;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// Declared length of a remote resource. The catalog server sometimes omits
/// Content-Length; that case is an explicit state, not a zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteSize {
    Known(u64),
    Unknown,
}

impl RemoteSize {
    pub fn matches(self, len: u64) -> bool {
        matches!(self, RemoteSize::Known(expected) if expected == len)
    }
}

impl fmt::Display for RemoteSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RemoteSize::Known(len) => write!(f, "{len}"),
            RemoteSize::Unknown => write!(f, "unknown"),
        }
    }
}

/// One downloadable archive in a release, identified by its filename.
/// Derived from discovery on every run, never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteFile {
    pub url: String,
    pub filename: String,
}

impl RemoteFile {
    pub fn from_url(url: &str) -> Option<Self> {
        let trimmed = url.trim_end_matches('/');
        let filename = trimmed.rsplit('/').next()?;
        if filename.is_empty() || !filename.contains('.') {
            return None;
        }
        Some(Self {
            url: url.to_string(),
            filename: filename.to_string(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    /// Local copy already matches the remote; no transfer happened.
    Skipped,
    Downloaded { attempts: u32 },
    Failed(FetchFailure),
}

impl FetchOutcome {
    pub fn is_success(&self) -> bool {
        !matches!(self, FetchOutcome::Failed(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchFailure {
    /// The size probe could not reach the remote at all.
    Unreachable(String),
    /// The remote answered but declared no length, so the download could
    /// never be verified.
    SizeUnknown,
    /// Every download attempt ended in a transfer error, size mismatch or
    /// corrupt archive.
    Exhausted { attempts: u32 },
}

impl fmt::Display for FetchFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchFailure::Unreachable(reason) => write!(f, "size probe failed: {reason}"),
            FetchFailure::SizeUnknown => write!(f, "remote declared no content length"),
            FetchFailure::Exhausted { attempts } => {
                write!(f, "gave up after {attempts} attempts")
            }
        }
    }
}

/// What to do when the download directory does not hold the expected number
/// of archives before extraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum CountMismatchPolicy {
    Abort,
    Confirm,
    Proceed,
}

/// Declarative schema for one fact table. All columns are TEXT; the dataset's
/// own typing is too inconsistent to coerce at load time.
#[derive(Debug, Clone, Copy)]
pub struct TableSchema {
    pub name: &'static str,
    pub pattern: &'static str,
    pub columns: &'static [&'static str],
}

/// Lookup tables in load order: (table name, decoded-file extension).
pub const LOOKUP_TABLES: &[(&str, &str)] = &[
    ("cnae", ".CNAECSV"),
    ("motivo", ".MOTICSV"),
    ("municipio", ".MUNICCSV"),
    ("natureza_juridica", ".NATJUCSV"),
    ("pais", ".PAISCSV"),
    ("qualificacao_socio", ".QUALSCSV"),
];

/// Fact tables in load order.
pub const FACT_TABLES: &[TableSchema] = &[
    TableSchema {
        name: "empresas",
        pattern: ".EMPRECSV",
        columns: &[
            "cnpj_basico",
            "razao_social",
            "natureza_juridica",
            "qualificacao_responsavel",
            "capital_social_str",
            "porte_empresa",
            "ente_federativo_responsavel",
        ],
    },
    TableSchema {
        name: "estabelecimento",
        pattern: ".ESTABELE",
        columns: &[
            "cnpj_basico",
            "cnpj_ordem",
            "cnpj_dv",
            "matriz_filial",
            "nome_fantasia",
            "situacao_cadastral",
            "data_situacao_cadastral",
            "motivo_situacao_cadastral",
            "nome_cidade_exterior",
            "pais",
            "data_inicio_atividades",
            "cnae_fiscal",
            "cnae_fiscal_secundaria",
            "tipo_logradouro",
            "logradouro",
            "numero",
            "complemento",
            "bairro",
            "cep",
            "uf",
            "municipio",
            "ddd1",
            "telefone1",
            "ddd2",
            "telefone2",
            "ddd_fax",
            "fax",
            "correio_eletronico",
            "situacao_especial",
            "data_situacao_especial",
        ],
    },
    TableSchema {
        name: "socios_original",
        pattern: ".SOCIOCSV",
        columns: &[
            "cnpj_basico",
            "identificador_de_socio",
            "nome_socio",
            "cnpj_cpf_socio",
            "qualificacao_socio",
            "data_entrada_sociedade",
            "pais",
            "representante_legal",
            "nome_representante",
            "qualificacao_representante_legal",
            "faixa_etaria",
        ],
    },
    TableSchema {
        name: "simples",
        pattern: ".SIMPLES.CSV.*",
        columns: &[
            "cnpj_basico",
            "opcao_simples",
            "data_opcao_simples",
            "data_exclusao_simples",
            "opcao_mei",
            "data_opcao_mei",
            "data_exclusao_mei",
        ],
    },
];
