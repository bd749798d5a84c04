//! Throwaway repositories for tests

use std::path::Path;

use git2::{Oid, Repository, RepositoryInitOptions, Signature};

/// Initialise a non-bare repository with `main` as initial branch and an identity
pub fn init_repo(path: &Path) -> Repository {
    let mut opts = RepositoryInitOptions::new();
    opts.initial_head("main");
    let repo = Repository::init_opts(path, &opts).unwrap();
    set_identity(&repo);
    repo
}

/// Initialise a bare repository to serve as a local remote
pub fn init_bare(path: &Path) -> Repository {
    let mut opts = RepositoryInitOptions::new();
    opts.bare(true).initial_head("main");
    Repository::init_opts(path, &opts).unwrap()
}

/// Configure the committer identity used by tests
pub fn set_identity(repo: &Repository) {
    let mut config = repo.config().unwrap();
    config.set_str("user.name", "Mod Author").unwrap();
    config.set_str("user.email", "author@example.com").unwrap();
}

/// Write `name` into the working tree without staging it
pub fn write_file(repo: &Repository, name: &str, content: &str) {
    let path = repo.workdir().unwrap().join(name);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(path, content).unwrap();
}

/// Write, stage and commit a file on the current branch
pub fn commit_file(repo: &Repository, name: &str, content: &str, message: &str) -> Oid {
    write_file(repo, name, content);

    let mut index = repo.index().unwrap();
    index.add_path(Path::new(name)).unwrap();
    index.write().unwrap();
    let tree_id = index.write_tree().unwrap();
    let tree = repo.find_tree(tree_id).unwrap();
    let sig = Signature::now("Mod Author", "author@example.com").unwrap();

    let parent = repo.head().ok().and_then(|h| h.peel_to_commit().ok());
    let parents: Vec<&git2::Commit<'_>> = parent.iter().collect();

    repo.commit(Some("HEAD"), &sig, &sig, message, &tree, &parents)
        .unwrap()
}

/// A bare remote with one commit on `main`, plus a working clone of it
///
/// Returns `(remote_path, clone_path)` below `base`.
pub fn remote_with_clone(base: &Path) -> (std::path::PathBuf, std::path::PathBuf) {
    let remote_path = base.join("remote.git");
    let seed_path = base.join("seed");
    let clone_path = base.join("clone");

    init_bare(&remote_path);
    let seed = init_repo(&seed_path);
    commit_file(&seed, "About/About.xml", "<ModMetaData/>", "initial");
    push_main(&seed, &remote_path);

    let clone = Repository::clone(remote_path.to_str().unwrap(), &clone_path).unwrap();
    set_identity(&clone);

    (remote_path, clone_path)
}

/// Push `main` of `repo` to the bare repository at `remote_path`
pub fn push_main(repo: &Repository, remote_path: &Path) {
    let url = remote_path.to_str().unwrap();
    let mut remote = match repo.find_remote("origin") {
        Ok(remote) => remote,
        Err(_) => repo.remote("origin", url).unwrap(),
    };
    remote
        .push(&["+refs/heads/main:refs/heads/main"], None)
        .unwrap();
}

/// Add a commit to the remote's `main` through a separate clone
pub fn advance_remote(base: &Path, remote_path: &Path, name: &str, content: &str) -> Oid {
    let path = base.join(format!("advance-{}", name.replace('/', "-")));
    let repo = Repository::clone(remote_path.to_str().unwrap(), &path).unwrap();
    set_identity(&repo);
    let oid = commit_file(&repo, name, content, &format!("update {}", name));
    push_main(&repo, remote_path);
    oid
}

/// URL of an HTTP remote that accepts connections and never answers
pub fn unresponsive_remote() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    std::thread::spawn(move || {
        let mut held = Vec::new();
        for stream in listener.incoming().flatten() {
            held.push(stream);
        }
    });
    format!("http://127.0.0.1:{}/mod.git", port)
}
