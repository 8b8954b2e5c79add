use std::fs::File;
use std::io::{self, Error, ErrorKind};
use std::os::unix::fs::{MetadataExt, PermissionsExt};
use std::path::Path;

/// Open the rule file, refusing to use it unless it is owned by root and
/// untouchable by anyone else. The checks run on the already-opened
/// descriptor so the file cannot be swapped underneath us.
pub fn secure_open_config(path: &Path) -> io::Result<File> {
    let error = |msg| Error::new(ErrorKind::PermissionDenied, msg);

    let file = File::open(path)?;
    let meta = file.metadata()?;

    if meta.uid() != 0 {
        return Err(error(format!("{} is not owned by root", path.display())));
    }
    if meta.permissions().mode() & 0o022 != 0 {
        return Err(error(format!(
            "{} is writable by group or other",
            path.display()
        )));
    }

    Ok(file)
}

#[cfg(test)]
mod test {
    use super::secure_open_config;
    use std::path::Path;

    #[test]
    fn secure_open_is_predictable() {
        // /etc/hosts should be readable and "secure" (if this test fails, you have been compromised)
        assert!(std::fs::File::open("/etc/hosts").is_ok());
        assert!(secure_open_config(Path::new("/etc/hosts")).is_ok());

        // /etc/shadow should not be readable
        assert!(std::fs::File::open("/etc/shadow").is_err());
        assert!(secure_open_config(Path::new("/etc/shadow")).is_err());

        // a file of our own is not owned by root
        let path = std::env::temp_dir().join("doas-audit-test");
        std::fs::write(&path, b"permit nobody\n").unwrap();
        if crate::system::User::real_uid() != crate::system::interface::UserId::ROOT {
            assert!(secure_open_config(&path).is_err());
        }
        std::fs::remove_file(&path).unwrap();
    }
}
