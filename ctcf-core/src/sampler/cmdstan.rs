//! CmdStan backend: compile the rendered Stan program with `make` and run
//! the resulting executable once per chain.

use log::{debug, info};
use std::{
    ffi::OsString,
    fs,
    path::{Path, PathBuf},
    process::{Command, Output},
};

use super::{ModelData, PosteriorSampler, PosteriorSamples};
use crate::config::SamplerConfig;
use crate::error::{Error, Result};
use crate::model::ModelVariant;
use crate::utils::open_file_for_write;

pub const CMDSTAN_ENV: &str = "CMDSTAN";

#[derive(Debug, Clone)]
pub struct CmdStan {
    home: PathBuf,
    config: SamplerConfig,
}

impl CmdStan {
    pub fn new<P: Into<PathBuf>>(home: P, config: SamplerConfig) -> Result<Self> {
        let home = home.into();
        if !home.join("makefile").is_file() {
            return Err(Error::ExternalEngine {
                stage: "setup".to_string(),
                diagnostic: format!("{} is not a CmdStan installation (no makefile found)", home.display()),
            });
        }
        Ok(Self { home, config })
    }

    /// Find the CmdStan installation: the explicit path if given, then the
    /// `CMDSTAN` environment variable, then the newest `~/.cmdstan/cmdstan-*`.
    pub fn locate(explicit: Option<&Path>, config: SamplerConfig) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::new(path, config);
        }
        if let Some(path) = std::env::var_os(CMDSTAN_ENV).filter(|x| !x.is_empty()) {
            return Self::new(path, config);
        }
        let default_dir = std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".cmdstan"));
        let newest = default_dir.as_ref()
            .and_then(|dir| fs::read_dir(dir).ok())
            .and_then(|entries| entries
                .filter_map(|e| e.ok().map(|e| e.path()))
                .filter(|p| p.is_dir() && p.file_name()
                    .and_then(|x| x.to_str()).map_or(false, |x| x.starts_with("cmdstan-")))
                .max()
            );
        match newest {
            Some(path) => Self::new(path, config),
            None => Err(Error::ExternalEngine {
                stage: "setup".to_string(),
                diagnostic: format!(
                    "CmdStan not found; pass its directory explicitly or set {}", CMDSTAN_ENV
                ),
            }),
        }
    }

    pub fn home(&self) -> &Path { &self.home }

    /// Write the Stan program of `model` into `workdir` and build it. An
    /// existing executable is reused when the program is unchanged.
    pub fn compile(&self, model: &ModelVariant, workdir: &Path) -> Result<PathBuf> {
        let workdir = absolute(workdir)?;
        let stan_file = workdir.join(format!("{}.stan", model.name));
        let exe = executable_path(&workdir, &model.name);
        let program = model.stan_program();

        let unchanged = fs::read_to_string(&stan_file).map_or(false, |x| x == program);
        if unchanged && exe.is_file() {
            debug!("Reusing compiled model {}", exe.display());
            return Ok(exe);
        }
        fs::write(&stan_file, &program)
            .map_err(|source| Error::File { path: stan_file.clone(), source })?;
        // A stale executable must not satisfy make's timestamp check.
        if exe.exists() {
            fs::remove_file(&exe).map_err(|source| Error::File { path: exe.clone(), source })?;
        }

        info!("Compiling model '{}'...", model.name);
        let mut cmd = Command::new("make");
        cmd.arg(&exe).current_dir(&self.home);
        run(cmd, "compilation")?;
        Ok(exe)
    }

    /// Command line arguments of one sampling run.
    pub fn sample_args(&self, data_file: &Path, output_file: &Path, chain: usize) -> Vec<OsString> {
        let mut data_arg = OsString::from("file=");
        data_arg.push(data_file);
        let mut output_arg = OsString::from("file=");
        output_arg.push(output_file);
        vec![
            "sample".into(),
            format!("num_samples={}", self.config.num_samples).into(),
            format!("num_warmup={}", self.config.num_warmup).into(),
            "data".into(),
            data_arg,
            "output".into(),
            output_arg,
            "random".into(),
            format!("seed={}", self.config.seed).into(),
            format!("id={}", chain).into(),
        ]
    }
}

impl PosteriorSampler for CmdStan {
    fn sample(&self, model: &ModelVariant, data: &ModelData, workdir: &Path) -> Result<PosteriorSamples> {
        fs::create_dir_all(workdir)
            .map_err(|source| Error::File { path: workdir.to_path_buf(), source })?;
        let exe = self.compile(model, workdir)?;
        let workdir = absolute(workdir)?;

        let data_file = workdir.join("data.json");
        let mut writer = open_file_for_write(&data_file)?;
        serde_json::to_writer(&mut writer, data)?;
        writer.finish()?;

        let mut samples = PosteriorSamples::new();
        for chain in 1..=self.config.chains {
            let output_file = workdir.join(format!("{}-{}.csv", model.name, chain));
            info!("Sampling '{}', chain {}/{}...", model.name, chain, self.config.chains);
            let mut cmd = Command::new(&exe);
            cmd.args(self.sample_args(&data_file, &output_file, chain)).current_dir(&workdir);
            run(cmd, &format!("sampling (chain {})", chain))?;
            samples.extend(PosteriorSamples::load(&output_file)?)?;
        }
        Ok(samples)
    }
}

/// Run an engine command to completion. A failure to start or a nonzero
/// exit status is fatal, with the engine's output passed through.
fn run(mut cmd: Command, stage: &str) -> Result<Output> {
    debug!("Running {:?}", cmd);
    let output = cmd.output().map_err(|e| Error::ExternalEngine {
        stage: stage.to_string(),
        diagnostic: format!("cannot run {:?}: {}", cmd.get_program(), e),
    })?;
    if output.status.success() {
        Ok(output)
    } else {
        Err(Error::ExternalEngine {
            stage: stage.to_string(),
            diagnostic: format!(
                "{}{}",
                String::from_utf8_lossy(&output.stdout),
                String::from_utf8_lossy(&output.stderr),
            ),
        })
    }
}

fn absolute(path: &Path) -> Result<PathBuf> {
    fs::canonicalize(path).map_err(|source| Error::File { path: path.to_path_buf(), source })
}

fn executable_path(dir: &Path, name: &str) -> PathBuf {
    if cfg!(windows) {
        dir.join(format!("{}.exe", name))
    } else {
        dir.join(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_requires_installation() {
        let dir = tempfile::tempdir().unwrap();
        let err = CmdStan::new(dir.path(), SamplerConfig::default()).unwrap_err();
        assert!(matches!(err, Error::ExternalEngine { ref stage, .. } if stage == "setup"));

        std::fs::write(dir.path().join("makefile"), "").unwrap();
        let stan = CmdStan::locate(Some(dir.path()), SamplerConfig::default()).unwrap();
        assert_eq!(stan.home(), dir.path());
    }

    #[test]
    fn test_sample_args() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("makefile"), "").unwrap();
        let config = SamplerConfig { chains: 2, num_samples: 300, num_warmup: 200, seed: 7 };
        let stan = CmdStan::new(dir.path(), config).unwrap();
        let args: Vec<String> = stan.sample_args(Path::new("/w/data.json"), Path::new("/w/m-2.csv"), 2)
            .into_iter().map(|x| x.into_string().unwrap()).collect();
        assert_eq!(args, vec![
            "sample", "num_samples=300", "num_warmup=200", "data", "file=/w/data.json",
            "output", "file=/w/m-2.csv", "random", "seed=7", "id=2",
        ]);
    }

    /// Stands in for CmdStan's makefile: every target becomes a copy of
    /// `stub_model.sh`, and each build is logged.
    const STUB_MAKEFILE: &str = ".SUFFIXES:\nmakefile: ;\nstub_model.sh: ;\n%:\n\tcp stub_model.sh $@\n\tchmod +x $@\n\techo $@ >> compiled.log\n";

    /// Writes two Stan-style draws per chain, with alpha set to the chain id.
    const STUB_MODEL: &str = r#"#!/bin/sh
prev=""
for arg in "$@"; do
  case "$prev:$arg" in
    data:file=*) data="${arg#file=}" ;;
    output:file=*) out="${arg#file=}" ;;
  esac
  case "$arg" in
    id=*) id="${arg#id=}" ;;
  esac
  prev="$arg"
done
test -s "$data" || exit 2
cat > "$out" <<EOF
# model = stub
# method = sample (Default)
lp__,accept_stat__,alpha,beta_motif,mu_0,mu_1,sigma_0,sigma_1
# Adaptation terminated
-1.5,0.9,$id,0.5,1,3,1,1
-2.5,0.8,$id,0.5,1,3,1,1
EOF
"#;

    #[cfg(unix)]
    #[test]
    fn test_sample_merges_chains() {
        let home = tempfile::tempdir().unwrap();
        std::fs::write(home.path().join("makefile"), STUB_MAKEFILE).unwrap();
        std::fs::write(home.path().join("stub_model.sh"), STUB_MODEL).unwrap();
        let config = SamplerConfig { chains: 2, num_samples: 2, num_warmup: 10, seed: 1 };
        let stan = CmdStan::new(home.path(), config).unwrap();

        let work = tempfile::tempdir().unwrap();
        let data = ModelData { n: 2, motif_score: vec![1.0, 2.0], chip_signal: vec![0.0, 3.0], y: vec![0, 1] };
        let model = ModelVariant::baseline();
        let samples = stan.sample(&model, &data, work.path()).unwrap();

        assert_eq!(samples.num_draws(), Some(4));
        let names: Vec<&str> = samples.names().collect();
        assert_eq!(names, vec!["alpha", "beta_motif", "mu_0", "mu_1", "sigma_0", "sigma_1"]);
        assert_eq!(samples.get("alpha"), Some(&[1.0, 1.0, 2.0, 2.0][..]));

        let payload = std::fs::read_to_string(work.path().join("data.json")).unwrap();
        assert_eq!(payload, r#"{"N":2,"motif_score":[1.0,2.0],"chip_signal":[0.0,3.0],"y":[0,1]}"#);
        assert!(work.path().join("baseline-1.csv").is_file());
        assert!(work.path().join("baseline-2.csv").is_file());
        assert!(work.path().join("baseline.stan").is_file());

        // An unchanged program is not rebuilt.
        let exe = stan.compile(&model, work.path()).unwrap();
        assert!(exe.is_file());
        let log = std::fs::read_to_string(home.path().join("compiled.log")).unwrap();
        assert_eq!(log.lines().count(), 1);

        // A changed program is.
        let mut tight = model.clone();
        tight.priors.alpha = crate::model::Prior::Normal(0.0, 0.5);
        stan.compile(&tight, work.path()).unwrap();
        let log = std::fs::read_to_string(home.path().join("compiled.log")).unwrap();
        assert_eq!(log.lines().count(), 2);
    }

    #[test]
    fn test_engine_failure_passes_output_through() {
        let mut cmd = Command::new("sh");
        cmd.args(["-c", "echo 'Semantic error in model.stan' >&2; exit 3"]);
        match run(cmd, "compilation") {
            Err(Error::ExternalEngine { stage, diagnostic }) => {
                assert_eq!(stage, "compilation");
                assert_eq!(diagnostic, "Semantic error in model.stan\n");
            },
            other => panic!("unexpected: {:?}", other),
        }

        let cmd = Command::new("/nonexistent/stan-model");
        assert!(matches!(run(cmd, "sampling"), Err(Error::ExternalEngine { .. })));
    }
}
