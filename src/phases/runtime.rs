//! Embedded POSIX shell runtime for generated scripts.
//!
//! The generated script is assembled from these templates plus per-justfile
//! code. Holes are spelled `@NAME@` and substituted by the emitter; keeping
//! the shell text in large literals (rather than composing it from fragments)
//! keeps the output reviewable next to a real script.

/// Shebang plus strict mode. `pipefail` is probed because dash and older ash
/// reject it.
pub const STRICT_PREAMBLE: &str = r##"#!/bin/sh

if (set -o pipefail) > /dev/null 2>&1; then
  set -euo pipefail
else
  set -eu
fi
"##;

/// Helper functions present in every generated script.
pub const HELPERS: &str = r##"# Sane, portable echo that never interprets backslashes
echo() {
  if [ "${#}" -gt 0 ]; then
    printf '%s\n' "${@}"
  else
    printf '\n'
  fi
}

hash_command() {
  command -v "${1}" > /dev/null 2>&1
}

# realpath is a GNU coreutils extension
realpath_portable() {
  if hash_command readlink && readlink -f / > /dev/null 2>&1; then
    readlink -f "${1}"
  elif [ -d "${1}" ]; then
    (cd "${1}" && pwd -P)
  elif [ -e "${1}" ]; then
    echo "$(cd "$(dirname "${1}")" && pwd -P)/$(basename "${1}")"
  else
    echo "${1}"
  fi
}

err() {
  echo "${COLOR_ERROR}error${COLOR_RESET}: ${COLOR_BOLD}${1}${COLOR_RESET}" >&2
}

warn() {
  echo "${COLOR_WARN}warning${COLOR_RESET}: ${COLOR_BOLD}${1}${COLOR_RESET}" >&2
}

die() {
  DIE_STATUS="${2:-1}"
  err "${1}"
  exit "${DIE_STATUS}"
}

recipe_error() {
  STATUS="${?}"
  if [ -z "${2:-}" ]; then
    err "Recipe \`${1}\` failed with exit code ${STATUS}"
  else
    err "Recipe \`${1}\` failed on line ${2} with exit code ${STATUS}"
  fi
  exit "${STATUS}"
}

echo_recipe_line() {
  echo "${COLOR_BOLD}${1}${COLOR_RESET}"
}

# $1 is 'true' when the line echoes by default
should_echo() {
  if [ "${VERBOSE}" = 'true' ] || [ "${DRY_RUN}" = 'true' ]; then
    return 0
  fi
  if [ "${QUIET}" = 'true' ]; then
    return 1
  fi
  [ "${1}" = 'true' ]
}

# $1 is 'true' when the recipe banner prints by default
should_banner() {
  if [ "${QUIET}" = 'true' ]; then
    return 1
  fi
  [ "${1}" = 'true' ]
}

# Single-quote an arbitrary string for the shell
quote() {
  printf "'"
  printf '%s' "${1}" | sed "s/'/'\\\\''/g"
  printf "'"
}

set_var() {
  SET_NAME="$(printf '%s' "${1}" | tr '-' '_')"
  export "VAR_${SET_NAME}=${2}"
}

set_color_mode() {
  case "${1}" in
  always|never|auto)
    COLOR_MODE="${1}"
    ;;
  *)
    die "invalid value for --color: \`${1}\`" 2
    ;;
  esac
  setup_colors
}

setup_colors() {
  SHOW_COLOR='false'
  case "${COLOR_MODE}" in
  always)
    SHOW_COLOR='true'
    ;;
  never)
    SHOW_COLOR='false'
    ;;
  *)
    if [ -t 1 ] && [ -z "${NO_COLOR:-}" ] && [ "${TERM:-}" != 'dumb' ]; then
      SHOW_COLOR='true'
    fi
    ;;
  esac
  if [ "${SHOW_COLOR}" = 'true' ]; then
    COLOR_RESET="$(printf '\033[m')"
    COLOR_BOLD="$(printf '\033[1m')"
    COLOR_ERROR="$(printf '\033[1m\033[31m')"
    COLOR_WARN="$(printf '\033[33m')"
    COLOR_RECIPE="$(printf '\033[36m')"
    COLOR_DEFAULT="$(printf '\033[32m')"
    COLOR_VARIADIC="$(printf '\033[35m')"
    COLOR_DOC="$(printf '\033[34m')"
  else
    COLOR_RESET=''
    COLOR_BOLD=''
    COLOR_ERROR=''
    COLOR_WARN=''
    COLOR_RECIPE=''
    COLOR_DEFAULT=''
    COLOR_VARIADIC=''
    COLOR_DOC=''
  fi
}

# Per-run recipe cache: one marker file per <recipe>/<argument digest>
run_cache_key() {
  CACHE_RECIPE="${1}"
  shift
  CACHE_DIGEST=''
  for CACHE_ARG in "${@}"; do
    CACHE_DIGEST="${CACHE_DIGEST}$(quote "${CACHE_ARG}")"
  done
  CACHE_DIGEST="$(printf '%s' "${CACHE_DIGEST}" | tr -c 'A-Za-z0-9._-' '_')"
  printf '%s/%s/%s' "${RUN_CACHE_DIR}" "${CACHE_RECIPE}" "${CACHE_DIGEST:-_}"
}

run_cache_mark() {
  mkdir -p "$(dirname "${1}")"
  : > "${1}"
}
"##;

/// Startup state: invocation bookkeeping, flag defaults, per-run tempdir with
/// cleanup trap. Holes: `@TEMPDIR@` (a `TMPDIR=…` line or nothing).
pub const INIT_TEMPLATE: &str = r##"INVOCATION_DIRECTORY="$(pwd)"
JUSTFILE_DIRECTORY="$(realpath_portable "$(dirname "${0}")")"
DEFAULT_SHELL='@SHELL@'
DEFAULT_SHELL_ARGS='@SHELL_ARGS@'
SHELL_ARGS_OVERRIDDEN='false'
LIST_HEADING='Available recipes:
'
LIST_PREFIX='    '
CHOOSER="${JUST_CHOOSER:-fzf}"
SORTED='true'
QUIET='false'
VERBOSE='false'
DRY_RUN='false'
FORCE_RUN='false'
COLOR_MODE='auto'
setup_colors

@TEMPDIR@RUN_CACHE_DIR="$(mktemp -d 2> /dev/null || TMPDIR="${HOME}" mktemp -d)"
trap 'rm -rf "${RUN_CACHE_DIR}"' EXIT
trap 'exit 129' HUP
trap 'exit 130' INT
trap 'exit 143' TERM
"##;

/// Sources the configured dotenv file, once, if it exists. Hole:
/// `@DOTENV_FILE@`.
pub const DOTENV_TEMPLATE: &str = r##"load_dotenv() {
  DOTENV_FILE=@DOTENV_FILE@
  if ! [ -f "${DOTENV_FILE}" ]; then
    return 0
  fi
  TEMP_DOTENV="$(mktemp "${RUN_CACHE_DIR}/dotenv_XXXXXX")"
  sed 's/^/export /g' "${DOTENV_FILE}" > "${TEMP_DOTENV}"
  . "${TEMP_DOTENV}"
  rm "${TEMP_DOTENV}"
}
load_dotenv
"##;

/// `--help` text. Holes: `@SCRIPT_NAME@`, `@VERSION@`.
pub const USAGE_TEMPLATE: &str = r##"usage() {
  cat <<EOF
${COLOR_DEFAULT}@SCRIPT_NAME@${COLOR_RESET} @VERSION@
    Generated from a justfile by justsh

${COLOR_WARN}USAGE:${COLOR_RESET}
    ./@SCRIPT_NAME@ [FLAGS] [OPTIONS] [ARGUMENTS]...

${COLOR_WARN}FLAGS:${COLOR_RESET}
        ${COLOR_DEFAULT}--choose${COLOR_RESET}      Select a recipe to run with \$JUST_CHOOSER (default \`fzf\`)
        ${COLOR_DEFAULT}--dump${COLOR_RESET}        Print the justfile
        ${COLOR_DEFAULT}--evaluate${COLOR_RESET}    Evaluate and print all variables, or one named variable
        ${COLOR_DEFAULT}--init${COLOR_RESET}        Initialize new justfile in project root
    ${COLOR_DEFAULT}-l, --list${COLOR_RESET}        List available recipes and their arguments
        ${COLOR_DEFAULT}--summary${COLOR_RESET}     List names of available recipes
        ${COLOR_DEFAULT}--show RECIPE${COLOR_RESET} Print the source of RECIPE
    ${COLOR_DEFAULT}-n, --dry-run${COLOR_RESET}     Print what would run without running it
    ${COLOR_DEFAULT}-q, --quiet${COLOR_RESET}       Suppress banners and command echo
        ${COLOR_DEFAULT}--verbose${COLOR_RESET}     Echo every command before running it
        ${COLOR_DEFAULT}--force${COLOR_RESET}       Ignore the per-run recipe cache
    ${COLOR_DEFAULT}-u, --unsorted${COLOR_RESET}    Return list entries in source order
    ${COLOR_DEFAULT}-h, --help${COLOR_RESET}        Print help information
    ${COLOR_DEFAULT}-V, --version${COLOR_RESET}     Print version information

${COLOR_WARN}OPTIONS:${COLOR_RESET}
        ${COLOR_DEFAULT}--chooser <CHOOSER>${COLOR_RESET}           Override binary invoked by --choose
        ${COLOR_DEFAULT}--color <WHEN>${COLOR_RESET}                always, never, or auto
        ${COLOR_DEFAULT}--list-heading <TEXT>${COLOR_RESET}         Print <TEXT> before list
        ${COLOR_DEFAULT}--list-prefix <TEXT>${COLOR_RESET}          Print <TEXT> before each list item
        ${COLOR_DEFAULT}--set <VARIABLE> <VALUE>${COLOR_RESET}      Override <VARIABLE> with <VALUE>
        ${COLOR_DEFAULT}--shell <SHELL>${COLOR_RESET}               Invoke <SHELL> to run recipes
        ${COLOR_DEFAULT}--shell-arg <SHELL-ARG>${COLOR_RESET}       Invoke shell with <SHELL-ARG>
        ${COLOR_DEFAULT}--working-directory <DIR>${COLOR_RESET}     Run with <DIR> as the working directory
        ${COLOR_DEFAULT}--justfile <FILE>${COLOR_RESET}             Accepted for compatibility; the justfile is inlined

${COLOR_WARN}ARGS:${COLOR_RESET}
    ${COLOR_DEFAULT}<ARGUMENTS>...${COLOR_RESET}    Overrides and recipe(s) to run, defaulting to the first recipe
EOF
}

err_usage() {
  cat <<EOF >&2
USAGE:
    ./@SCRIPT_NAME@ [FLAGS] [OPTIONS] [ARGUMENTS]...

For more information try ${COLOR_DEFAULT}--help${COLOR_RESET}
EOF
}
"##;

/// Names of every supported builtin function.
pub const BUILTINS: [&str; 38] = [
  "os",
  "os_family",
  "arch",
  "env_var",
  "env_var_or_default",
  "justfile",
  "justfile_directory",
  "invocation_directory",
  "invocation_directory_native",
  "just_executable",
  "just_pid",
  "clean",
  "join",
  "absolute_path",
  "extension",
  "file_name",
  "file_stem",
  "parent_directory",
  "without_extension",
  "quote",
  "replace",
  "replace_regex",
  "uppercase",
  "lowercase",
  "capitalize",
  "lowercamelcase",
  "snakecase",
  "kebabcase",
  "shoutysnakecase",
  "shoutykebabcase",
  "trim",
  "error",
  "path_exists",
  "uuid",
  "sha256",
  "sha256_file",
  "blake3",
  "blake3_file",
];

pub fn is_builtin(name: &str) -> bool {
  BUILTINS.contains(&name)
}

/// Internal helpers a builtin's shell body relies on. They are emitted before
/// the builtin itself, once each.
pub fn builtin_dependencies(name: &str) -> &'static [&'static str] {
  match name {
    "absolute_path" => &["clean"],
    "uuid" => &["random_hex_bytes"],
    "lowercamelcase" | "snakecase" | "kebabcase" | "shoutysnakecase" | "shoutykebabcase" => {
      &["split_words"]
    }
    _ => &[],
  }
}

/// POSIX shell body for one builtin; empty when the always-present helper
/// section already provides it.
pub fn builtin_source(name: &str) -> &'static str {
  match name {
    "os" => {
      r##"os() {
  case "$(uname -s | tr '[:upper:]' '[:lower:]')" in
  *darwin*)
    echo "macos"
    ;;
  *linux*)
    echo "linux"
    ;;
  *windows*|*msys*)
    echo "windows"
    ;;
  *)
    echo "unknown"
    ;;
  esac
}
"##
    }
    "os_family" => {
      r##"os_family() {
  case "$(uname -s | tr '[:upper:]' '[:lower:]')" in
  *windows*|*msys*)
    echo "windows"
    ;;
  *)
    echo "unix"
    ;;
  esac
}
"##
    }
    "arch" => {
      r##"arch() {
  case "$(uname -m | tr '[:upper:]' '[:lower:]')" in
  *aarch64*|*armv[8-9]*)
    echo "aarch64"
    ;;
  *aarch32*|*arm*)
    echo "arm"
    ;;
  *mips*)
    echo "mips"
    ;;
  *powerpc64*|*ppc64*)
    echo "powerpc64"
    ;;
  *powerpc*|*ppc*)
    echo "powerpc"
    ;;
  *s390*)
    echo "s390x"
    ;;
  *sparc*)
    echo "sparc"
    ;;
  *86_64*)
    echo "x86_64"
    ;;
  *86*)
    echo "x86"
    ;;
  *)
    echo "unknown"
    ;;
  esac
}
"##
    }
    "env_var" => {
      r##"env_var() {
  sh -c 'set -u; echo "${'"${1}"'}"' 2> /dev/null || (
    err "Call to function \`env_var\` failed: environment variable \`${1}\` not present"
    exit 1
  ) || exit "${?}"
}
"##
    }
    "env_var_or_default" => {
      r##"env_var_or_default() {
  VARSTR="$(
    sh -c 'set -u; echo "${'"${1}"'}"' 2> /dev/null \
      || echo "${1}=${2}"
  )"
  echo "${VARSTR}" \
    | sed 's/^[^=][^=]*=\(.*\)$/\1/'
}
"##
    }
    "justfile" => {
      r##"justfile() {
  realpath_portable "${0}"
}
"##
    }
    "justfile_directory" => {
      r##"justfile_directory() {
  printf '%s\n' "${JUSTFILE_DIRECTORY}"
}
"##
    }
    "invocation_directory" => {
      r##"invocation_directory() {
  realpath_portable "${INVOCATION_DIRECTORY}"
}
"##
    }
    "invocation_directory_native" => {
      r##"invocation_directory_native() {
  realpath_portable "${INVOCATION_DIRECTORY}"
}
"##
    }
    "just_executable" => {
      r##"just_executable() {
  realpath_portable "${0}"
}
"##
    }
    "just_pid" => {
      r##"just_pid() {
  echo "${$}"
}
"##
    }
    "clean" => {
      r##"clean() {
  printf '%s\n' "${1}" | awk '{
    absolute = substr($0, 1, 1) == "/"
    n = split($0, parts, "/")
    depth = 0
    for (i = 1; i <= n; i++) {
      p = parts[i]
      if (p == "" || p == ".") continue
      if (p == "..") {
        if (depth > 0 && stack[depth] != "..") { depth--; continue }
        if (absolute) continue
        stack[++depth] = ".."
        continue
      }
      stack[++depth] = p
    }
    out = ""
    for (i = 1; i <= depth; i++) out = out "/" stack[i]
    if (absolute) {
      if (out == "") out = "/"
    } else {
      out = substr(out, 2)
      if (out == "") out = "."
    }
    print out
  }'
}
"##
    }
    "join" => {
      r##"join() {
  printf "%s/" "${@}" | sed 's:/$::'
  echo
}
"##
    }
    "absolute_path" => {
      r##"absolute_path() {
  case "${1}" in
  /*)
    clean "${1}"
    ;;
  *)
    clean "${INVOCATION_DIRECTORY}/${1}"
    ;;
  esac
}
"##
    }
    "extension" => {
      r##"extension() {
  EXT_NAME="${1##*/}"
  case "${EXT_NAME}" in
  *.*)
    printf '%s\n' "${EXT_NAME##*.}"
    ;;
  *)
    err "Call to function \`extension\` failed: path \`${1}\` has no extension"
    exit 1
    ;;
  esac
}
"##
    }
    "file_name" => {
      r##"file_name() {
  printf '%s\n' "${1##*/}"
}
"##
    }
    "file_stem" => {
      r##"file_stem() {
  STEM_NAME="${1##*/}"
  printf '%s\n' "${STEM_NAME%.*}"
}
"##
    }
    "parent_directory" => {
      r##"parent_directory() {
  dirname "${1}"
}
"##
    }
    "without_extension" => {
      r##"without_extension() {
  case "${1##*/}" in
  *.*)
    printf '%s\n' "${1%.*}"
    ;;
  *)
    err "Call to function \`without_extension\` failed: path \`${1}\` has no extension"
    exit 1
    ;;
  esac
}
"##
    }
    // quote is part of the always-present helpers
    "quote" => "",
    "replace" => {
      r##"replace() {
  printf '%s\n' "${1}" | awk -v from="${2}" -v to="${3}" '
    NR > 1 { printf "\n" }
    {
      if (from == "") { printf "%s", $0; next }
      rest = $0
      while ((i = index(rest, from)) > 0) {
        printf "%s%s", substr(rest, 1, i - 1), to
        rest = substr(rest, i + length(from))
      }
      printf "%s", rest
    }'
  echo
}
"##
    }
    "replace_regex" => {
      r##"replace_regex() {
  printf '%s\n' "${1}" | awk -v pat="${2}" -v rep="${3}" '
    NR > 1 { printf "\n" }
    {
      gsub(pat, rep, $0)
      printf "%s", $0
    }'
  echo
}
"##
    }
    "uppercase" => {
      r##"uppercase() {
  echo "${1}" | tr '[:lower:]' '[:upper:]'
}
"##
    }
    "lowercase" => {
      r##"lowercase() {
  echo "${1}" | tr '[:upper:]' '[:lower:]'
}
"##
    }
    "capitalize" => {
      r##"capitalize() {
  CAP_HEAD="$(printf '%s' "${1}" | cut -c1 | tr '[:lower:]' '[:upper:]')"
  CAP_REST="$(printf '%s' "${1}" | cut -c2- | tr '[:upper:]' '[:lower:]')"
  printf '%s%s\n' "${CAP_HEAD}" "${CAP_REST}"
}
"##
    }
    "split_words" => {
      r##"split_words() {
  printf '%s\n' "${1}" \
    | sed 's/\([a-z0-9]\)\([A-Z]\)/\1 \2/g' \
    | tr '_-' '  ' \
    | tr -s ' ' '\n'
}
"##
    }
    "lowercamelcase" => {
      r##"lowercamelcase() {
  split_words "${1}" | awk '
    NR == 1 { printf "%s", tolower($0); next }
    { printf "%s%s", toupper(substr($0, 1, 1)), tolower(substr($0, 2)) }'
  echo
}
"##
    }
    "snakecase" => {
      r##"snakecase() {
  split_words "${1}" | awk '
    NR > 1 { printf "_" }
    { printf "%s", tolower($0) }'
  echo
}
"##
    }
    "kebabcase" => {
      r##"kebabcase() {
  split_words "${1}" | awk '
    NR > 1 { printf "-" }
    { printf "%s", tolower($0) }'
  echo
}
"##
    }
    "shoutysnakecase" => {
      r##"shoutysnakecase() {
  split_words "${1}" | awk '
    NR > 1 { printf "_" }
    { printf "%s", toupper($0) }'
  echo
}
"##
    }
    "shoutykebabcase" => {
      r##"shoutykebabcase() {
  split_words "${1}" | awk '
    NR > 1 { printf "-" }
    { printf "%s", toupper($0) }'
  echo
}
"##
    }
    "trim" => {
      r##"trim() {
  printf '%s' "${1}" | awk '
    { text = text sep $0; sep = "\n" }
    END {
      sub(/^[ \t\r\n]+/, "", text)
      sub(/[ \t\r\n]+$/, "", text)
      printf "%s\n", text
    }'
}
"##
    }
    "error" => {
      r##"error() {
  err "Call to function \`error\` failed: ${*:-}"
  exit 1
}
"##
    }
    "path_exists" => {
      r##"path_exists() {
  test -e "${1}" && echo "true" || echo "false"
}
"##
    }
    "random_hex_bytes" => {
      r##"random_hex_bytes() {
  RANDOM_SOURCE="/dev/urandom"
  if ! [ -e "${RANDOM_SOURCE}" ]; then
    RANDOM_SOURCE="/dev/random"
    if [ -e "${RANDOM_SOURCE}" ]; then
      warn "only pseudo-randomness available"
    else
      err "No randomness available"
      exit 1
    fi
  fi
  head -c "${1}" "${RANDOM_SOURCE}" \
    | od -t x1 \
    | head -n -1 \
    | cut -d ' ' -f 2- \
    | tr -d ' \n'
}
"##
    }
    "uuid" => {
      r##"uuid() {
  (
    if [ -e /proc/sys/kernel/random/uuid ]; then
      cat /proc/sys/kernel/random/uuid
    elif hash_command uuidgen; then
      uuidgen
    elif hash_command python3; then
      python3 -c 'import uuid; print(uuid.uuid4())'
    else
      VARIANT_BYTE="$(random_hex_bytes 1)"
      while ! echo "${VARIANT_BYTE}" | grep '^[89ab].$' > /dev/null; do
        VARIANT_BYTE="$(random_hex_bytes 1)"
      done
      MATCH='^\(........\)\(....\).\(...\)..\(..\)\(............\)$'
      NEW_PATTERN='\1-\2-4\3-'"${VARIANT_BYTE}"'\4-\5'
      random_hex_bytes 16 \
        | sed "s/${MATCH}/${NEW_PATTERN}/"
      echo
    fi
  ) | tr '[:upper:]' '[:lower:]'
}
"##
    }
    "sha256" => {
      r##"sha256() {
  if hash_command sha256sum; then
    printf "%s" "${1}" | sha256sum --binary | cut -d ' ' -f 1
  elif hash_command python3; then
    printf "%s" "${1}" | \
      python3 -c 'from hashlib import sha256; import sys; print(sha256(sys.stdin.buffer.read()).hexdigest())'
  elif hash_command python; then
    printf "%s" "${1}" | \
      python -c 'from hashlib import sha256; import sys; print sha256(sys.stdin.read()).hexdigest()'
  else
    err "No sha256sum binary found"
    exit 1
  fi
}
"##
    }
    "sha256_file" => {
      r##"sha256_file() {
  if hash_command sha256sum; then
    sha256sum --binary "${1}" | cut -d ' ' -f 1
  elif hash_command python3; then
    python3 -c 'from hashlib import sha256; import sys; print(sha256(sys.stdin.buffer.read()).hexdigest())' \
      < "${1}"
  else
    err "No sha256sum binary found"
    exit 1
  fi
}
"##
    }
    "blake3" => {
      r##"blake3() {
  if hash_command b3sum; then
    printf "%s" "${1}" | b3sum --no-names
  else
    err "No blake3 binary found"
    exit 1
  fi
}
"##
    }
    "blake3_file" => {
      r##"blake3_file() {
  if hash_command b3sum; then
    b3sum --no-names "${1}"
  else
    err "No blake3 binary found"
    exit 1
  fi
}
"##
    }
    _ => "",
  }
}
