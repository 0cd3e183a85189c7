use std::fmt;

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum RedirectOp {
    Input,  // <
    Output, // >
    Append, // >>
}

impl RedirectOp {
    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            "<" => Some(RedirectOp::Input),
            ">" => Some(RedirectOp::Output),
            ">>" => Some(RedirectOp::Append),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RedirectOp::Input => "<",
            RedirectOp::Output => ">",
            RedirectOp::Append => ">>",
        }
    }
}

impl fmt::Display for RedirectOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 管道中的一个阶段，对应一个子进程
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StageDescriptor {
    pub program: String,
    pub arguments: Vec<String>,
    pub input_path: Option<String>,
    pub output_path: Option<String>,
    pub append_output: bool,
}

impl StageDescriptor {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            ..Default::default()
        }
    }

    pub fn has_redirection(&self) -> bool {
        self.input_path.is_some() || self.output_path.is_some()
    }
}

impl fmt::Display for StageDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let words = std::iter::once(&self.program).chain(self.arguments.iter());
        f.write_str(&shell_words::join(words))?;
        if let Some(path) = &self.input_path {
            write!(f, " {} {}", RedirectOp::Input, shell_words::quote(path))?;
        }
        if let Some(path) = &self.output_path {
            let op = if self.append_output {
                RedirectOp::Append
            } else {
                RedirectOp::Output
            };
            write!(f, " {} {}", op, shell_words::quote(path))?;
        }
        Ok(())
    }
}

/// 非空的阶段序列。只有第一个阶段的输入重定向和最后一个阶段的输出重定向会生效，
/// 中间阶段上的重定向由执行器忽略而不是在解析时报错。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pipeline {
    stages: Vec<StageDescriptor>,
}

impl Pipeline {
    pub fn from_stages(stages: Vec<StageDescriptor>) -> Option<Self> {
        if stages.is_empty() {
            None
        } else {
            Some(Self { stages })
        }
    }

    pub fn single(stage: StageDescriptor) -> Self {
        Self {
            stages: vec![stage],
        }
    }

    pub fn stages(&self) -> &[StageDescriptor] {
        &self.stages
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    pub fn is_single(&self) -> bool {
        self.stages.len() == 1
    }

    pub fn first(&self) -> &StageDescriptor {
        &self.stages[0]
    }

    pub fn last(&self) -> &StageDescriptor {
        &self.stages[self.stages.len() - 1]
    }

    /// 把 `stage` 上的重定向挂到管道边界：输入给第一个阶段，输出给最后一个阶段
    pub fn with_redirections_of(mut self, stage: &StageDescriptor) -> Self {
        if let (Some(path), Some(first)) = (&stage.input_path, self.stages.first_mut()) {
            first.input_path = Some(path.clone());
        }
        if let (Some(path), Some(last)) = (&stage.output_path, self.stages.last_mut()) {
            last.output_path = Some(path.clone());
            last.append_output = stage.append_output;
        }
        self
    }
}

impl fmt::Display for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, stage) in self.stages.iter().enumerate() {
            if i > 0 {
                f.write_str(" | ")?;
            }
            write!(f, "{}", stage)?;
        }
        Ok(())
    }
}
