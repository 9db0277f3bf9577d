// ABOUTME: Terminal plumbing for interactive task sessions.
// ABOUTME: Raw-mode guard, window size lookup, and stdio stream copying.

use crate::error::{Error, Result};
use crate::runtime::AttachStreams;
use futures::StreamExt;
use nix::sys::termios::{self, SetArg, Termios};
use tokio::io::AsyncWriteExt;
use tracing::error;

/// Puts the calling terminal into raw mode for the guard's lifetime.
///
/// Raw mode prevents an "echoing" effect where users see their own input
/// twice when running shell applications like `bash`. The previous terminal
/// state is restored on drop, failure paths included.
pub struct RawModeGuard {
    original: Termios,
}

impl RawModeGuard {
    pub fn new() -> Result<Self> {
        let stdin = std::io::stdin();
        let original =
            termios::tcgetattr(&stdin).map_err(|e| Error::Terminal(e.to_string()))?;

        let mut raw = original.clone();
        termios::cfmakeraw(&mut raw);
        termios::tcsetattr(&stdin, SetArg::TCSANOW, &raw)
            .map_err(|e| Error::Terminal(e.to_string()))?;

        Ok(Self { original })
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        let stdin = std::io::stdin();
        if let Err(restore_error) = termios::tcsetattr(&stdin, SetArg::TCSANOW, &self.original) {
            error!(error = %restore_error, "failed to restore terminal");
        }
    }
}

/// Current size of the calling terminal as (columns, rows).
pub fn terminal_size() -> std::io::Result<(u16, u16)> {
    let mut ws = nix::libc::winsize {
        ws_row: 0,
        ws_col: 0,
        ws_xpixel: 0,
        ws_ypixel: 0,
    };

    let rc = unsafe {
        nix::libc::ioctl(nix::libc::STDIN_FILENO, nix::libc::TIOCGWINSZ, &mut ws)
    };
    if rc != 0 {
        return Err(std::io::Error::last_os_error());
    }

    Ok((ws.ws_col, ws.ws_row))
}

/// Connect an attached container session to the calling terminal and block
/// until either side of the stream closes.
pub async fn stream_interactive(streams: AttachStreams) -> Result<()> {
    let _raw = RawModeGuard::new()?;

    let AttachStreams {
        mut output,
        mut input,
    } = streams;

    let mut stdin_task = tokio::spawn(async move {
        let mut stdin = tokio::io::stdin();
        tokio::io::copy(&mut stdin, &mut input).await.map(|_| ())
    });

    let mut stdout_task = tokio::spawn(async move {
        let mut stdout = tokio::io::stdout();
        while let Some(chunk) = output.next().await {
            let chunk = chunk.map_err(std::io::Error::other)?;
            stdout.write_all(&chunk.into_bytes()).await?;
            stdout.flush().await?;
        }
        Ok::<(), std::io::Error>(())
    });

    // Whichever copier finishes first ends the session.
    let finished = tokio::select! {
        result = &mut stdin_task => result,
        result = &mut stdout_task => result,
    };
    stdin_task.abort();
    stdout_task.abort();

    match finished {
        Ok(Ok(())) => Ok(()),
        Ok(Err(io_error)) => Err(Error::Io(io_error)),
        Err(join_error) if join_error.is_cancelled() => Ok(()),
        Err(join_error) => Err(Error::Terminal(join_error.to_string())),
    }
}
