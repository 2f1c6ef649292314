//! Detaching a worker from the dispatcher's session.

/// Start a new session so the worker outlives the dispatcher's terminal and
/// is not hit by signals sent to its process group.
///
/// Fails when the process already leads a process group, which is harmless
/// for a worker started directly from a shell.
#[cfg(unix)]
pub fn detach() -> std::io::Result<()> {
    // SAFETY: setsid takes no arguments and touches no memory we own.
    let sid = unsafe { libc::setsid() };
    if sid == -1 {
        return Err(std::io::Error::last_os_error());
    }
    tracing::debug!(sid, "Worker detached into a new session");
    Ok(())
}

#[cfg(not(unix))]
pub fn detach() -> std::io::Result<()> {
    Ok(())
}
