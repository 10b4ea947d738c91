use crate::EnvVars;

use super::{ContainerPort, ContainerSpec, PullPolicy};

/// Container definition handed to [`super::WorkloadSpecBuilder::container`].
///
/// Each [`ContainerDef::command`] call appends one command entry together with its own arguments.
/// The first entry's command becomes the entrypoint; its arguments, then every later entry
/// followed by its own arguments, make up `args`. The container's argv keeps call order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerDef {
    name: String,
    image: String,
    pull_policy: PullPolicy,
    ports: Vec<ContainerPort>,
    env: EnvVars,
    commands: Vec<(String, Vec<String>)>,
}

impl ContainerDef {
    pub fn new(name: impl Into<String>, image: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            image: image.into(),
            pull_policy: PullPolicy::default(),
            ports: Vec::new(),
            env: EnvVars::new(),
            commands: Vec::new(),
        }
    }

    pub fn pull_policy(mut self, policy: PullPolicy) -> Self {
        self.pull_policy = policy;
        self
    }

    pub fn port(mut self, port: ContainerPort) -> Self {
        self.ports.push(port);
        self
    }

    pub fn ports(mut self, ports: impl IntoIterator<Item = ContainerPort>) -> Self {
        self.ports.extend(ports);
        self
    }

    pub fn env(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push(name, value);
        self
    }

    pub fn envs(mut self, env: &EnvVars) -> Self {
        self.env = self.env.merged(env);
        self
    }

    pub fn command<I, S>(mut self, command: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.commands
            .push((command.into(), args.into_iter().map(Into::into).collect()));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub(super) fn into_spec(self) -> ContainerSpec {
        let mut command = Vec::new();
        let mut args = Vec::new();
        for (cmd, cmd_args) in self.commands {
            if command.is_empty() {
                command.push(cmd);
            } else {
                args.push(cmd);
            }
            args.extend(cmd_args);
        }
        ContainerSpec {
            name: self.name,
            image: self.image,
            image_pull_policy: self.pull_policy,
            ports: self.ports,
            env: self.env,
            command,
            args,
        }
    }
}
