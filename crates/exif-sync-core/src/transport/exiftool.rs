use std::io::{BufRead, BufReader, Write};
use std::path::Path;
use std::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command, Stdio};
use std::sync::LazyLock;
use std::time::{Duration, Instant};

use regex::Regex;

use super::{MetadataTransport, WriteOptions};
use crate::error::TransportError;
use crate::record::MetadataRecord;

const CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

static WRITE_SUMMARY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^\s*(?P<count>\d+) (image )?files? (updated|unchanged)").unwrap()
});

/// Raw output of one `-execute` round trip.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Response {
    pub stdout: String,
    pub stderr: String,
}

/// Long-lived `exiftool -stay_open` session.
///
/// The process is told to exit when the session is closed or dropped, so it
/// never outlives the run that opened it. On Unix it runs in its own process
/// group: a terminal Ctrl-C reaches only this tool, which finishes the file in
/// flight and then shuts the session down.
pub struct ExifTool {
    child: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
    stderr: BufReader<ChildStderr>,
    seq: u64,
    closed: bool,
}

impl ExifTool {
    /// Spawn `program` in stay-open mode, reading arguments from stdin.
    pub fn open(program: &str) -> Result<Self, TransportError> {
        let spawn_err = |source| TransportError::Spawn {
            program: program.to_string(),
            source,
        };
        let mut command = Command::new(program);
        command
            .args(["-stay_open", "True", "-@", "-"])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            command.process_group(0);
        }
        let mut child = command.spawn().map_err(spawn_err)?;

        let pipes = (child.stdin.take(), child.stdout.take(), child.stderr.take());
        let (Some(stdin), Some(stdout), Some(stderr)) = pipes else {
            let _ = child.kill();
            let _ = child.wait();
            return Err(TransportError::Closed);
        };

        Ok(Self {
            child,
            stdin,
            stdout: BufReader::new(stdout),
            stderr: BufReader::new(stderr),
            seq: 0,
            closed: false,
        })
    }

    /// Run one command and collect its output.
    pub fn execute(&mut self, args: &[String]) -> Result<Response, TransportError> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        self.seq += 1;
        let marker = format!("{{ready{}}}", self.seq);

        let sent = (|| -> std::io::Result<()> {
            for arg in args {
                writeln!(self.stdin, "{}", arg)?;
            }
            writeln!(self.stdin, "-echo4")?;
            writeln!(self.stdin, "{}", marker)?;
            writeln!(self.stdin, "-execute{}", self.seq)?;
            self.stdin.flush()
        })();
        if let Err(e) = sent {
            self.closed = true;
            return Err(e.into());
        }

        let stdout = read_until_marker(&mut self.stdout, &marker);
        let both = stdout
            .and_then(|out| read_until_marker(&mut self.stderr, &marker).map(|err| (out, err)));
        match both {
            Ok((stdout, stderr)) => Ok(Response { stdout, stderr }),
            Err(e) => {
                self.closed = true;
                Err(e)
            }
        }
    }

    /// Ask the process to exit and reap it.
    pub fn close(mut self) -> Result<(), TransportError> {
        self.shutdown()
    }

    fn shutdown(&mut self) -> Result<(), TransportError> {
        if self.child.try_wait()?.is_some() {
            self.closed = true;
            return Ok(());
        }
        let sent = if self.closed {
            Err(std::io::Error::from(std::io::ErrorKind::BrokenPipe))
        } else {
            writeln!(self.stdin, "-stay_open")
                .and_then(|_| writeln!(self.stdin, "False"))
                .and_then(|_| self.stdin.flush())
        };
        self.closed = true;
        if sent.is_err() {
            self.child.kill()?;
        }

        let deadline = Instant::now() + CLOSE_TIMEOUT;
        loop {
            if self.child.try_wait()?.is_some() {
                return Ok(());
            }
            if Instant::now() >= deadline {
                self.child.kill()?;
                self.child.wait()?;
                return Ok(());
            }
            std::thread::sleep(Duration::from_millis(20));
        }
    }
}

impl Drop for ExifTool {
    fn drop(&mut self) {
        let _ = self.shutdown();
    }
}

impl MetadataTransport for ExifTool {
    fn read(&mut self, path: &Path) -> Result<MetadataRecord, TransportError> {
        let response = self.execute(&read_args(path)?)?;
        parse_read_output(path, &response)
    }

    fn write(
        &mut self,
        path: &Path,
        fields: &MetadataRecord,
        options: WriteOptions,
    ) -> Result<(), TransportError> {
        let response = self.execute(&write_args(path, fields, options)?)?;
        parse_write_output(path, &response)
    }
}

fn read_until_marker<R: BufRead>(
    reader: &mut R,
    marker: &str,
) -> Result<String, TransportError> {
    let mut out = String::new();
    let mut line = String::new();
    loop {
        line.clear();
        if reader.read_line(&mut line)? == 0 {
            return Err(TransportError::Closed);
        }
        if line.trim_end() == marker {
            return Ok(out);
        }
        out.push_str(&line);
    }
}

/// Arguments travel one per line, so a newline would split them.
fn arg_line(text: String, path: &Path) -> Result<String, TransportError> {
    if text.contains('\n') || text.contains('\r') {
        return Err(TransportError::Write {
            path: path.to_path_buf(),
            message: format!("argument contains a line break: {:?}", text),
        });
    }
    Ok(text)
}

/// Embedded metadata only: the File group is excluded.
pub fn read_args(path: &Path) -> Result<Vec<String>, TransportError> {
    Ok(vec![
        "-json".to_string(),
        "--File:all".to_string(),
        arg_line(path.display().to_string(), path)?,
    ])
}

pub fn write_args(
    path: &Path,
    fields: &MetadataRecord,
    options: WriteOptions,
) -> Result<Vec<String>, TransportError> {
    let mut args = Vec::with_capacity(fields.len() + 2);
    if options.overwrite_original {
        args.push("-overwrite_original".to_string());
    }
    for (field, value) in fields.iter() {
        args.push(arg_line(format!("-{}={}", field, value), path)?);
    }
    args.push(arg_line(path.display().to_string(), path)?);
    Ok(args)
}

fn error_lines(stderr: &str) -> Option<String> {
    let errors: Vec<&str> = stderr
        .lines()
        .map(str::trim)
        .filter(|l| l.starts_with("Error"))
        .collect();
    (!errors.is_empty()).then(|| errors.join("; "))
}

pub fn parse_read_output(
    path: &Path,
    response: &Response,
) -> Result<MetadataRecord, TransportError> {
    if response.stdout.trim().is_empty() {
        let message = error_lines(&response.stderr)
            .unwrap_or_else(|| "no metadata returned".to_string());
        return Err(TransportError::Read {
            path: path.to_path_buf(),
            message,
        });
    }
    let objects: Vec<serde_json::Map<String, serde_json::Value>> =
        serde_json::from_str(&response.stdout).map_err(|source| TransportError::Decode {
            path: path.to_path_buf(),
            source,
        })?;
    let Some(mut object) = objects.into_iter().next() else {
        return Err(TransportError::Read {
            path: path.to_path_buf(),
            message: "no metadata returned".to_string(),
        });
    };
    object.remove("SourceFile");
    Ok(MetadataRecord::from_json_object(&object))
}

pub fn parse_write_output(path: &Path, response: &Response) -> Result<(), TransportError> {
    if let Some(message) = error_lines(&response.stderr) {
        return Err(TransportError::Write {
            path: path.to_path_buf(),
            message,
        });
    }
    let touched = WRITE_SUMMARY_RE
        .captures_iter(&response.stdout)
        .filter_map(|c| c["count"].parse::<u64>().ok())
        .any(|n| n > 0);
    if touched {
        Ok(())
    } else {
        let detail = [response.stdout.trim(), response.stderr.trim()]
            .into_iter()
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join("; ");
        Err(TransportError::Write {
            path: path.to_path_buf(),
            message: if detail.is_empty() {
                "no files updated".to_string()
            } else {
                detail
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(stdout: &str, stderr: &str) -> Response {
        Response {
            stdout: stdout.to_string(),
            stderr: stderr.to_string(),
        }
    }

    #[test]
    fn test_read_args_exclude_file_group() {
        let args = read_args(Path::new("/media/a.mov")).unwrap();
        assert_eq!(args, vec!["-json", "--File:all", "/media/a.mov"]);
    }

    #[test]
    fn test_write_args() {
        let fields: MetadataRecord = [
            ("CreateDate", "2021:05:01 10:00:00"),
            ("ModifyDate", "2021:05:02 09:00:00"),
        ]
        .into_iter()
        .collect();
        let path = Path::new("/m/b.mov");
        let overwrite = WriteOptions {
            overwrite_original: true,
        };
        let args = write_args(path, &fields, overwrite).unwrap();
        assert_eq!(
            args,
            vec![
                "-overwrite_original",
                "-CreateDate=2021:05:01 10:00:00",
                "-ModifyDate=2021:05:02 09:00:00",
                "/m/b.mov",
            ]
        );
        let keep = WriteOptions {
            overwrite_original: false,
        };
        let args = write_args(path, &fields, keep).unwrap();
        assert_eq!(args.len(), 3);

        let bad: MetadataRecord = [("CreateDate", "2021\n-delete")].into_iter().collect();
        assert!(write_args(path, &bad, overwrite).is_err());
    }

    #[test]
    fn test_parse_read_output() {
        let out = r#"[{
  "SourceFile": "/m/a.mov",
  "ExifToolVersion": 12.76,
  "CreateDate": "2021:05:01 10:00:00",
  "MediaCreateDate": "2021:05:01 10:00:01"
}]"#;
        let record = parse_read_output(Path::new("/m/a.mov"), &response(out, "")).unwrap();
        assert!(!record.contains("SourceFile"));
        assert_eq!(record.get("CreateDate"), Some("2021:05:01 10:00:00"));
        assert_eq!(record.get("ExifToolVersion"), Some("12.76"));
    }

    #[test]
    fn test_parse_read_output_errors() {
        let path = Path::new("/m/x.mov");
        let err = parse_read_output(path, &response("", "Error: File not found - /m/x.mov\n"));
        match err {
            Err(TransportError::Read { message, .. }) => {
                assert!(message.contains("File not found"))
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(matches!(
            parse_read_output(path, &response("not json", "")),
            Err(TransportError::Decode { .. })
        ));
        assert!(parse_read_output(path, &response("[]", "")).is_err());
    }

    #[test]
    fn test_parse_write_output() {
        let path = Path::new("/m/a.mov");
        assert!(parse_write_output(path, &response("    1 image files updated\n", "")).is_ok());
        assert!(parse_write_output(path, &response("    1 image files unchanged\n", "")).is_ok());
        assert!(parse_write_output(path, &response("    0 image files updated\n", "")).is_err());
        let err = parse_write_output(
            path,
            &response(
                "    0 image files updated\n    1 files weren't updated due to errors\n",
                "Error: Not a valid MOV - /m/a.mov\n",
            ),
        );
        match err {
            Err(TransportError::Write { message, .. }) => {
                assert!(message.contains("Not a valid MOV"))
            }
            other => panic!("unexpected {:?}", other),
        }
        // warnings alone do not fail a write
        let warned = response("    1 image files updated\n", "Warning: minor\n");
        assert!(parse_write_output(path, &warned).is_ok());
    }

    #[test]
    fn test_read_until_marker() {
        let mut input = std::io::Cursor::new(b"line one\nline two\n{ready3}\nnext\n".to_vec());
        let out = read_until_marker(&mut input, "{ready3}").unwrap();
        assert_eq!(out, "line one\nline two\n");
        let mut truncated = std::io::Cursor::new(b"partial\n".to_vec());
        let result = read_until_marker(&mut truncated, "{ready1}");
        assert!(matches!(result, Err(TransportError::Closed)));
    }

    #[test]
    fn test_open_missing_program() {
        let result = ExifTool::open("/nonexistent/definitely-not-exiftool");
        assert!(matches!(result, Err(TransportError::Spawn { .. })));
    }

    /// Minimal stay-open responder: JSON for `-json` requests, a write
    /// summary otherwise.
    #[cfg(unix)]
    const STAND_IN: &str = r#"#!/bin/sh
json=0
while IFS= read -r line; do
  case "$line" in
    -json) json=1 ;;
    -execute*)
      n=${line#-execute}
      if [ "$json" = 1 ]; then
        echo '[{"SourceFile":"/m/a.mov","CreateDate":"2021:05:01 10:00:00"}]'
      else
        echo '    1 image files updated'
      fi
      echo "{ready$n}"
      echo "{ready$n}" >&2
      json=0 ;;
    False) exit 0 ;;
  esac
done
"#;

    #[cfg(unix)]
    fn stand_in(dir: &Path) -> String {
        use std::os::unix::fs::PermissionsExt;
        let path = dir.join("exiftool");
        std::fs::write(&path, STAND_IN).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path.display().to_string()
    }

    #[cfg(unix)]
    #[test]
    fn test_session_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let mut tool = ExifTool::open(&stand_in(dir.path())).unwrap();
        let path = Path::new("/m/a.mov");

        let record = tool.read(path).unwrap();
        assert_eq!(record.get("CreateDate"), Some("2021:05:01 10:00:00"));
        let fields: MetadataRecord = [("CreateDate", "2021:05:01 10:00:00")].into_iter().collect();
        let opts = WriteOptions {
            overwrite_original: true,
        };
        tool.write(path, &fields, opts).unwrap();
        assert_eq!(tool.seq, 2);
        tool.close().unwrap();
    }

    /// Process group id, the fifth field of `/proc/<pid>/stat`.
    #[cfg(target_os = "linux")]
    fn process_group(pid: &str) -> String {
        let stat = std::fs::read_to_string(format!("/proc/{}/stat", pid)).unwrap();
        let (_, rest) = stat.rsplit_once(')').unwrap();
        rest.split_whitespace().nth(2).unwrap().to_string()
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_child_runs_in_own_process_group() {
        let dir = tempfile::tempdir().unwrap();
        let tool = ExifTool::open(&stand_in(dir.path())).unwrap();
        let pid = tool.child.id().to_string();

        let group = process_group(&pid);
        assert_eq!(group, pid);
        assert_ne!(group, process_group("self"));
        tool.close().unwrap();
    }
}
