// erl_subprocess.rs - Probe VM interface for runtime introspection
//
// Every query starts a short-lived `erl` VM that evaluates one snippet and
// prints its result as JSON. The snippet reaches the target through a single
// `Call(M, F, A)` fun: `erlang:apply/3` for the local installation and
// `rpc:call/5` from a hidden probe node for a remote target. Local queries
// read .beam files and doc chunks instead of loading modules.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::anyhow;
use async_trait::async_trait;
use serde::Deserialize;
use tokio::process::Command;

use crate::config::IntrospectionConfig;
use crate::docs::{
    select_members, DocCache, DocumentationRecord, DocumentationSource, DocumentedMember,
    MemberKind,
};
use crate::error::CallError;
use crate::introspection::{
    CallableKind, ExportEntry, IntrospectionProvider, RuntimeTarget, TypeEntry,
};

/// Prefix the probe prints instead of JSON when the snippet raised.
const ERROR_MARKER: &str = "__BEAMSENSE_ERROR__:";

/// Exported macros show up as functions named `MACRO-<name>` with one extra
/// leading argument (the caller environment).
const MACRO_PREFIX: &str = "MACRO-";

/// Slack on top of the call timeout for VM startup and distribution setup.
const PROBE_STARTUP_GRACE: Duration = Duration::from_secs(3);

const LOADED_MODULES_QUERY: &str = r#"[atom_to_binary(M) || {M, _} <- Call(code, all_loaded, [])]"#;

const MODULE_AVAILABLE_QUERY: &str = r#"case Call(code, which, [@MODULE@]) of
        non_existing -> false;
        _ -> true
    end"#;

const EXPORTS_QUERY: &str = r#"Exports = case Call(code, is_loaded, [@MODULE@]) of
        {file, _} -> Call(erlang, get_module_info, [@MODULE@, exports]);
        false ->
            case Call(code, which, [@MODULE@]) of
                File when is_list(File) ->
                    {ok, {_, [{exports, E}]}} = Call(beam_lib, chunks, [File, [exports]]),
                    E;
                Other -> throw({not_found, Other})
            end
    end,
    [#{name => atom_to_binary(F), arity => A} || {F, A} <- Exports]"#;

const TYPES_QUERY: &str = r#"FromDocs = case Call(code, get_doc, [@MODULE@]) of
        {ok, {docs_v1, _, _, _, _, _, Docs}} -> [{N, A} || {{type, N, A}, _, _, _, _} <- Docs];
        _ -> undefined
    end,
    Types = case FromDocs of
        undefined ->
            case Call(code, which, [@MODULE@]) of
                File when is_list(File) ->
                    case Call(beam_lib, chunks, [File, [abstract_code]]) of
                        {ok, {_, [{abstract_code, {raw_abstract_v1, Forms}}]}} ->
                            [T || {attribute, _, export_type, Ts} <- Forms, T <- Ts];
                        _ -> throw(no_abstract_code)
                    end;
                Other -> throw({not_found, Other})
            end;
        Listed -> Listed
    end,
    [#{name => atom_to_binary(N), arity => A} || {N, A} <- Types]"#;

const DOCS_QUERY: &str = r#"Forms = case Call(code, which, [@MODULE@]) of
        File when is_list(File) ->
            case Call(beam_lib, chunks, [File, [abstract_code]]) of
                {ok, {_, [{abstract_code, {raw_abstract_v1, Fs}}]}} -> Fs;
                _ -> []
            end;
        _ -> []
    end,
    Specs = [{{function, N, A}, iolist_to_binary(erl_pp:form(F))}
             || {attribute, _, spec, {{N, A}, _}} = F <- Forms]
         ++ [{{type, N, length(As)}, iolist_to_binary(erl_pp:form(F))}
             || {attribute, _, K, {N, _, As}} = F <- Forms, K =:= type orelse K =:= opaque],
    SpecsFor = fun(Key) -> [S || {K2, S} <- Specs, K2 =:= Key] end,
    Text = fun(#{<<"en">> := T}) when is_binary(T) -> T; (_) -> null end,
    Meta = fun(M) ->
        maps:from_list([{atom_to_binary(K), V}
                        || {K, V} <- maps:to_list(M), is_atom(K), is_binary(V)])
    end,
    case Call(code, get_doc, [@MODULE@]) of
        {ok, {docs_v1, _, _, _, _, _, Docs}} ->
            [#{kind => atom_to_binary(K), name => atom_to_binary(N), arity => A,
               signatures => Sig, doc => Text(D), meta => Meta(Md),
               specs => SpecsFor({if K =:= macro -> function; true -> K end, N, A})}
             || {{K, N, A}, _, Sig, D, Md} <- Docs, lists:member(K, [function, macro, type])];
        {error, Reason} -> throw({no_docs, Reason})
    end"#;

/// Probe VM runner implementing runtime introspection and documentation
/// lookup.
pub struct ErlSubprocess {
    erl_path: PathBuf,
    cookie: Option<String>,
    long_names: bool,
    call_timeout: Duration,
    doc_cache: DocCache,
    probe_seq: AtomicUsize,
}

impl ErlSubprocess {
    /// Create a runner for a validated `erl` executable.
    ///
    /// An explicit path is validated and used; without one, `erl` is looked
    /// up on `PATH` and then in common install locations.
    pub fn new(erl_path: Option<PathBuf>) -> Option<Self> {
        let path = match erl_path {
            Some(p) => {
                if Self::is_valid_erl_executable(&p) {
                    Some(p)
                } else {
                    log::trace!("Provided erl path is not valid: {:?}", p);
                    None
                }
            }
            None => Self::discover_erl_path(),
        };

        path.map(|erl_path| {
            log::trace!("Using erl executable at: {:?}", erl_path);
            let config = IntrospectionConfig::default();
            Self {
                erl_path,
                cookie: None,
                long_names: false,
                call_timeout: config.call_timeout(),
                doc_cache: DocCache::new(config.doc_cache_entries),
                probe_seq: AtomicUsize::new(0),
            }
        })
    }

    /// Build a runner from settings.
    pub fn from_config(config: &IntrospectionConfig) -> anyhow::Result<Self> {
        let base = Self::new(config.erl_path.clone()).ok_or_else(|| match &config.erl_path {
            Some(p) => anyhow!("erl executable at {} is not usable", p.display()),
            None => anyhow!("no erl executable found on PATH or in common locations"),
        })?;
        Ok(Self {
            cookie: config.cookie.clone(),
            long_names: config.long_names,
            call_timeout: config.call_timeout(),
            doc_cache: DocCache::new(config.doc_cache_entries),
            ..base
        })
    }

    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    pub fn erl_path(&self) -> &Path {
        &self.erl_path
    }

    /// Number of modules with cached documentation.
    pub fn cached_doc_modules(&self) -> usize {
        self.doc_cache.len()
    }

    fn discover_erl_path() -> Option<PathBuf> {
        if let Some(path) = Self::find_erl_in_path() {
            return Some(path);
        }
        Self::get_common_erl_paths()
            .into_iter()
            .find(|p| Self::is_valid_erl_executable(p))
    }

    fn find_erl_in_path() -> Option<PathBuf> {
        #[cfg(unix)]
        {
            let output = std::process::Command::new("which")
                .arg("erl")
                .output()
                .ok()?;
            if output.status.success() {
                let path = PathBuf::from(String::from_utf8_lossy(&output.stdout).trim());
                if Self::is_valid_erl_executable(&path) {
                    return Some(path);
                }
            }
        }

        #[cfg(windows)]
        {
            let output = std::process::Command::new("where")
                .arg("erl")
                .output()
                .ok()?;
            if output.status.success() {
                let stdout = String::from_utf8_lossy(&output.stdout);
                // `where` may return multiple lines; take the first one
                if let Some(first_line) = stdout.lines().next() {
                    let path = PathBuf::from(first_line.trim());
                    if Self::is_valid_erl_executable(&path) {
                        return Some(path);
                    }
                }
            }
        }

        None
    }

    fn get_common_erl_paths() -> Vec<PathBuf> {
        let mut paths = Vec::new();

        #[cfg(target_os = "macos")]
        {
            paths.push(PathBuf::from("/opt/homebrew/bin/erl"));
            paths.push(PathBuf::from("/usr/local/bin/erl"));
        }

        #[cfg(target_os = "linux")]
        {
            paths.push(PathBuf::from("/usr/bin/erl"));
            paths.push(PathBuf::from("/usr/local/bin/erl"));
            paths.push(PathBuf::from("/usr/lib/erlang/bin/erl"));
        }

        #[cfg(unix)]
        {
            // Version managers
            if let Ok(home) = std::env::var("HOME") {
                paths.push(PathBuf::from(format!("{}/.asdf/shims/erl", home)));
                paths.push(PathBuf::from(format!("{}/.local/share/mise/shims/erl", home)));
            }
        }

        #[cfg(target_os = "windows")]
        {
            if let Ok(entries) = std::fs::read_dir("C:\\Program Files") {
                for entry in entries.flatten() {
                    if entry.file_name().to_string_lossy().starts_with("Erlang OTP") {
                        paths.push(entry.path().join("bin").join("erl.exe"));
                    }
                }
            }
        }

        paths
    }

    /// Whether `path` exists and can evaluate a trivial expression.
    fn is_valid_erl_executable(path: &Path) -> bool {
        if !path.exists() {
            return false;
        }
        std::process::Command::new(path)
            .args(["-noshell", "-eval", "halt(0)."])
            .output()
            .map(|output| output.status.success())
            .unwrap_or(false)
    }

    /// Command-line arguments for one probe run.
    fn probe_args(&self, target: &RuntimeTarget, program: String) -> Vec<String> {
        let mut args = vec!["-noshell".to_string()];
        if target.is_remote() {
            let seq = self.probe_seq.fetch_add(1, Ordering::Relaxed);
            let name = format!("beamsense_probe_{}_{}", std::process::id(), seq);
            args.push("-hidden".to_string());
            args.push(if self.long_names { "-name" } else { "-sname" }.to_string());
            args.push(name);
            if let Some(cookie) = &self.cookie {
                args.push("-setcookie".to_string());
                args.push(cookie.clone());
            }
        }
        args.push("-eval".to_string());
        args.push(program);
        args
    }

    /// Wrap a query body into a complete `-eval` program for `target`.
    fn build_program(&self, target: &RuntimeTarget, body: &str) -> Result<String, CallError> {
        let call = match target {
            RuntimeTarget::Local => "Call = fun(M, F, A) -> erlang:apply(M, F, A) end,".to_string(),
            RuntimeTarget::Remote(node) => {
                if !is_valid_node_name(node) {
                    return Err(CallError::InvalidName(node.clone()));
                }
                format!(
                    "Call = fun(M, F, A) -> case rpc:call({}, M, F, A, {}) of \
                     {{badrpc, Reason}} -> throw({{badrpc, Reason}}); Value -> Value end end,",
                    quote_atom(node),
                    self.call_timeout.as_millis()
                )
            }
        };
        Ok(format!(
            "{call}\n\
             try\n    {body}\n\
             of\n    ProbeOut -> io:put_chars(unicode:characters_to_list(json:encode(ProbeOut)))\n\
             catch\n    ProbeClass:ProbeReason -> io:put_chars([\"{ERROR_MARKER}\", \
             io_lib:format(\"~p:~P\", [ProbeClass, ProbeReason, 20])])\n\
             end,\n\
             halt(0)."
        ))
    }

    /// Run `body` against `target` and return the probe's stdout.
    pub async fn execute(&self, target: &RuntimeTarget, body: &str) -> Result<String, CallError> {
        let program = self.build_program(target, body)?;
        let timeout = self.call_timeout + PROBE_STARTUP_GRACE;
        let start = std::time::Instant::now();

        let mut cmd = Command::new(&self.erl_path);
        cmd.args(self.probe_args(target, program))
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .kill_on_drop(true);
        let child = cmd.spawn().map_err(CallError::Spawn)?;
        let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Ok(result) => result.map_err(CallError::Spawn)?,
            Err(_) => return Err(CallError::Timeout(timeout)),
        };

        let elapsed = start.elapsed();
        crate::perf::record_probe_call(elapsed);
        if crate::perf::is_enabled() {
            let preview: String = body.chars().take(50).collect();
            log::info!("[PERF] probe call on '{}' ({:?}): {}", target, elapsed, preview);
        }

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(CallError::Failed(format!(
                "probe exited with status {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        check_error_marker(&stdout)?;
        Ok(stdout)
    }

    async fn module_query(
        &self,
        target: &RuntimeTarget,
        module: &str,
        template: &str,
    ) -> Result<String, CallError> {
        if !is_valid_atom_name(module) {
            return Err(CallError::InvalidName(module.to_string()));
        }
        self.execute(target, &template.replace("@MODULE@", &quote_atom(module)))
            .await
    }

    /// The whole documentation table of `module`, cached per target.
    async fn module_docs(
        &self,
        target: &RuntimeTarget,
        module: &str,
    ) -> Result<Arc<Vec<DocumentedMember>>, CallError> {
        if let Some(cached) = self.doc_cache.get(target, module) {
            log::trace!("Docs for '{}' on '{}' found in cache", module, target);
            return Ok(cached);
        }
        let output = self.module_query(target, module, DOCS_QUERY).await?;
        let table = Arc::new(parse_docs_output(&output)?);
        log::trace!(
            "Fetched {} doc entries for '{}' on '{}'",
            table.len(),
            module,
            target
        );
        self.doc_cache.insert(target, module, table.clone());
        Ok(table)
    }
}

#[async_trait]
impl IntrospectionProvider for ErlSubprocess {
    async fn list_loaded_modules(&self, target: &RuntimeTarget) -> Result<Vec<String>, CallError> {
        let output = self.execute(target, LOADED_MODULES_QUERY).await?;
        Ok(serde_json::from_str(&output)?)
    }

    async fn module_available(
        &self,
        target: &RuntimeTarget,
        module: &str,
    ) -> Result<bool, CallError> {
        let output = self
            .module_query(target, module, MODULE_AVAILABLE_QUERY)
            .await?;
        Ok(serde_json::from_str(&output)?)
    }

    async fn list_exports(
        &self,
        target: &RuntimeTarget,
        module: &str,
    ) -> Result<Vec<ExportEntry>, CallError> {
        let output = self.module_query(target, module, EXPORTS_QUERY).await?;
        let exports = parse_exports_output(&output)?;
        log::trace!("Got {} exports for '{}' on '{}'", exports.len(), module, target);
        Ok(exports)
    }

    async fn list_types(
        &self,
        target: &RuntimeTarget,
        module: &str,
    ) -> Result<Vec<TypeEntry>, CallError> {
        let output = self.module_query(target, module, TYPES_QUERY).await?;
        Ok(parse_types_output(&output)?)
    }
}

#[async_trait]
impl DocumentationSource for ErlSubprocess {
    async fn lookup_members(
        &self,
        target: &RuntimeTarget,
        module: &str,
        members: &[(String, u32)],
        kinds: &[MemberKind],
    ) -> Result<Vec<DocumentedMember>, CallError> {
        if members.is_empty() {
            return Ok(Vec::new());
        }
        let table = self.module_docs(target, module).await?;
        Ok(select_members(&table, members, kinds))
    }

    fn forget_target(&self, target: &RuntimeTarget) {
        self.doc_cache.invalidate_target(target);
    }
}

// ----------------------------------------------------------------------------
// Output parsing
// ----------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct RawNameArity {
    name: String,
    arity: u32,
}

#[derive(Debug, Deserialize)]
struct RawMember {
    kind: String,
    name: String,
    arity: u32,
    #[serde(default)]
    signatures: Vec<String>,
    doc: Option<String>,
    #[serde(default)]
    meta: BTreeMap<String, String>,
    #[serde(default)]
    specs: Vec<String>,
}

fn check_error_marker(output: &str) -> Result<(), CallError> {
    match output.trim_start().strip_prefix(ERROR_MARKER) {
        Some(message) => Err(CallError::Failed(message.trim().to_string())),
        None => Ok(()),
    }
}

/// Exports with `MACRO-` entries turned into macros of their source arity.
fn parse_exports_output(output: &str) -> Result<Vec<ExportEntry>, serde_json::Error> {
    let raw: Vec<RawNameArity> = serde_json::from_str(output)?;
    Ok(raw
        .into_iter()
        .map(|entry| match entry.name.strip_prefix(MACRO_PREFIX) {
            Some(name) if entry.arity > 0 => ExportEntry {
                name: name.to_string(),
                arity: entry.arity - 1,
                kind: CallableKind::Macro,
            },
            _ => ExportEntry::function(entry.name, entry.arity),
        })
        .collect())
}

fn parse_types_output(output: &str) -> Result<Vec<TypeEntry>, serde_json::Error> {
    let raw: Vec<RawNameArity> = serde_json::from_str(output)?;
    Ok(raw
        .into_iter()
        .map(|entry| TypeEntry::new(entry.name, entry.arity))
        .collect())
}

fn parse_docs_output(output: &str) -> Result<Vec<DocumentedMember>, serde_json::Error> {
    let raw: Vec<RawMember> = serde_json::from_str(output)?;
    Ok(raw
        .into_iter()
        .filter_map(|member| {
            let kind = match member.kind.as_str() {
                "function" => MemberKind::Function,
                "macro" => MemberKind::Macro,
                "type" => MemberKind::Type,
                _ => return None,
            };
            Some(DocumentedMember {
                kind,
                name: member.name,
                arity: member.arity,
                record: DocumentationRecord {
                    docs: member.doc.filter(|d| !d.trim().is_empty()),
                    signatures: member.signatures,
                    specs: member.specs.into_iter().map(|s| s.trim().to_string()).collect(),
                    metadata: member.meta,
                    from_default: false,
                },
            })
        })
        .collect())
}

// ----------------------------------------------------------------------------
// Atom handling
// ----------------------------------------------------------------------------

/// Quote `name` as an Erlang atom literal.
fn quote_atom(name: &str) -> String {
    let mut quoted = String::with_capacity(name.len() + 2);
    quoted.push('\'');
    for c in name.chars() {
        match c {
            '\\' => quoted.push_str("\\\\"),
            '\'' => quoted.push_str("\\'"),
            _ => quoted.push(c),
        }
    }
    quoted.push('\'');
    quoted
}

/// Module and function names are passed into probe code, so reject anything
/// that is not a plain atom: empty, too long, or containing control
/// characters.
fn is_valid_atom_name(name: &str) -> bool {
    !name.is_empty() && name.chars().count() <= 255 && !name.chars().any(char::is_control)
}

/// `name@host` with both halves non-empty.
fn is_valid_node_name(node: &str) -> bool {
    match node.split_once('@') {
        Some((name, host)) => {
            !name.is_empty() && !host.is_empty() && is_valid_atom_name(node) && !node.contains(' ')
        }
        None => false,
    }
}
